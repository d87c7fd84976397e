//! [`Database`]-related implementations.

#[cfg(feature = "inmem")]
pub mod inmem;

use derive_more::{Display, Error as StdError, From};

use crate::domain::{
    user::{self, one_time},
    User,
};

#[cfg(feature = "inmem")]
pub use self::inmem::InMemory;

/// Database operation.
pub use common::Handler as Database;

/// [`Database`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    #[cfg(feature = "inmem")]
    /// [`InMemory`] error.
    Inmem(inmem::Error),
}

/// Insert of a new [`User`], conditional on its [`user::Email`] being
/// unoccupied.
///
/// A [`Database`] applies the occupancy check and the insert as a single
/// atomic operation. Two concurrent registrations of the same
/// [`user::Email`] can never both succeed.
#[derive(Clone, Debug)]
pub struct NewUser(pub User);

/// Outcome of inserting a [`NewUser`].
#[derive(Clone, Copy, Debug)]
pub enum Insertion {
    /// [`User`] was inserted.
    Inserted,

    /// Another [`User`] already occupies the [`user::Email`].
    EmailOccupied,
}

/// Conditional update consuming a [`one_time::OneTime`] token of a [`User`].
///
/// A [`Database`] applies this as a single atomic operation: the stored
/// token for the [`one_time::Purpose`] is compared against the `candidate`
/// (equality before expiry, so an expired token fails even on an exact
/// match), and only on success it is cleared together with the dependent
/// state change. Two concurrent consumers can never both succeed against
/// the same token.
#[derive(Clone, Debug)]
pub struct ConsumeOneTime {
    /// ID of the [`User`] whose token is being consumed.
    pub user_id: user::Id,

    /// [`one_time::Purpose`] of the token being consumed.
    pub purpose: one_time::Purpose,

    /// Candidate [`one_time::Value`] provided by the caller.
    pub candidate: one_time::Value,

    /// New [`user::PasswordHash`] to apply within the same update.
    ///
    /// Provided by the password reset flow only.
    pub new_password_hash: Option<user::PasswordHash>,
}

/// Outcome of a [`ConsumeOneTime`] operation.
#[derive(Clone, Debug)]
pub enum Consumption {
    /// Token was consumed, returning the updated [`User`].
    Consumed(User),

    /// [`User`] does not exist.
    NoUser,

    /// [`User`] has no active token of the requested
    /// [`one_time::Purpose`].
    NoToken,

    /// Provided candidate does not match the stored token.
    Mismatch,

    /// Stored token matches, but is expired.
    Expired,
}
