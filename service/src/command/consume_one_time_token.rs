//! [`Command`] for consuming a [`OneTime`] token.

use common::operations::{By, Select, Update};
use derive_more::{Display, Error, From};
use secrecy::{ExposeSecret, SecretBox};
use tracerr::Traced;

#[cfg(doc)]
use crate::domain::user::{OneTime, Password};
use crate::{
    domain::{
        user::{self, one_time},
        User,
    },
    infra::{
        database::{self, ConsumeOneTime, Consumption},
        Database,
    },
    Service,
};

use super::Command;

/// [`Command`] for consuming a [`OneTime`] token.
///
/// Consuming is atomic: a token succeeds at most once, and a failed attempt
/// leaves the stored token intact. A wrong, expired or absent token is
/// reported uniformly as [`ExecutionError::WrongToken`], so the caller cannot
/// tell which one it hit.
#[derive(Clone, Debug)]
pub enum ConsumeOneTimeToken {
    /// Consume an account verification token, marking the [`User`] as
    /// verified.
    Verification {
        /// ID of the [`User`] being verified.
        user_id: user::Id,

        /// Candidate token value to consume.
        candidate: one_time::Value,
    },

    /// Consume a password reset token, replacing the [`User`]'s password.
    PasswordReset {
        /// [`user::Email`] of the [`User`] resetting its password.
        email: user::Email,

        /// Candidate token value to consume.
        candidate: one_time::Value,

        /// New [`Password`] to set.
        new_password: SecretBox<user::Password>,
    },
}

impl<Db> Command<ConsumeOneTimeToken> for Service<Db>
where
    Db: for<'e> Database<
            Select<By<Option<User>, &'e user::Email>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<
            Update<ConsumeOneTime>,
            Ok = Consumption,
            Err = Traced<database::Error>,
        >,
{
    type Ok = User;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: ConsumeOneTimeToken,
    ) -> Result<Self::Ok, Self::Err> {
        use ConsumeOneTimeToken as Cmd;
        use ExecutionError as E;

        let consume = match cmd {
            Cmd::Verification { user_id, candidate } => ConsumeOneTime {
                user_id,
                purpose: one_time::Purpose::Verification,
                candidate,
                new_password_hash: None,
            },
            Cmd::PasswordReset {
                email,
                candidate,
                new_password,
            } => {
                let user = self
                    .database()
                    .execute(Select(By::new(&email)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .ok_or_else(|| E::WrongToken)
                    .map_err(tracerr::wrap!())?;
                let hash =
                    user::PasswordHash::new(new_password.expose_secret())
                        .map_err(tracerr::from_and_wrap!(=> E))?;
                ConsumeOneTime {
                    user_id: user.id,
                    purpose: one_time::Purpose::PasswordReset,
                    candidate,
                    new_password_hash: Some(hash),
                }
            }
        };

        match self
            .database()
            .execute(Update(consume))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
        {
            Consumption::Consumed(user) => Ok(user),
            Consumption::NoUser
            | Consumption::NoToken
            | Consumption::Mismatch
            | Consumption::Expired => Err(tracerr::new!(E::WrongToken)),
        }
    }
}

/// Error of [`ConsumeOneTimeToken`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Failed to hash the provided [`Password`].
    #[display("Failed to hash password: {_0}")]
    #[from]
    HashPassword(#[error(not(source))] argon2::password_hash::Error),

    /// Provided token is wrong, expired or was never issued.
    #[display("Invalid or expired token")]
    WrongToken,
}
