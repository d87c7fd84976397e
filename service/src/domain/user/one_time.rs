//! [`OneTime`] token definitions.

use std::{str::FromStr, time::Duration};

use common::{unit, DateTime, DateTimeOf};
use derive_more::{AsRef, Display};
use rand::{distributions::Alphanumeric, Rng as _};

#[cfg(doc)]
use crate::domain::User;

/// Single-use, time-bounded token attached to a [`User`] record.
///
/// Used for out-of-band identity proofs: account verification and password
/// reset.
#[derive(Clone, Debug)]
pub struct OneTime {
    /// Random [`Value`] of this [`OneTime`] token.
    pub value: Value,

    /// [`DateTime`] when this [`OneTime`] token expires.
    pub expires_at: ExpirationDateTime,
}

impl OneTime {
    /// Generates a new [`OneTime`] token expiring in `ttl` from now.
    #[must_use]
    pub fn generate(ttl: Duration) -> Self {
        Self {
            value: Value::random(),
            expires_at: (DateTime::now() + ttl).coerce(),
        }
    }

    /// Checks whether the given `candidate` matches this [`OneTime`] token's
    /// [`Value`].
    #[must_use]
    pub fn matches(&self, candidate: &Value) -> bool {
        self.value == *candidate
    }

    /// Checks whether this [`OneTime`] token is expired at the given moment.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime) -> bool {
        self.expires_at <= now.coerce()
    }
}

/// Purpose a [`OneTime`] token is issued for.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Purpose {
    /// Confirming ownership of a [`User`]'s email address.
    #[display("verification")]
    Verification,

    /// Authorizing a password change of a [`User`].
    #[display("password reset")]
    PasswordReset,
}

/// Opaque random value of a [`OneTime`] token.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct Value(String);

impl Value {
    /// Number of characters in a generated [`Value`].
    pub const LEN: usize = 48;

    /// Generates a new random [`Value`].
    #[must_use]
    pub fn random() -> Self {
        Self(
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(Self::LEN)
                .map(char::from)
                .collect(),
        )
    }

    /// Creates a new [`Value`] if the given `value` is well-formed.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        Self::check(&value).then_some(Self(value))
    }

    /// Checks whether the given `value` is a well-formed [`Value`].
    fn check(value: impl AsRef<str>) -> bool {
        let value = value.as_ref();
        !value.is_empty()
            && value.len() <= 128
            && value.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

impl FromStr for Value {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid one-time token value")
    }
}

/// [`DateTime`] of a [`OneTime`] token expiration.
pub type ExpirationDateTime = DateTimeOf<(OneTime, unit::Expiration)>;

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::DateTime;

    use super::{OneTime, Value};

    #[test]
    fn generates_distinct_values() {
        assert_ne!(Value::random(), Value::random());
    }

    #[test]
    fn expires_exactly_at_deadline() {
        let token = OneTime::generate(Duration::from_secs(60));

        let now = DateTime::now();
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + Duration::from_secs(61)));
    }
}
