//! [`Session`] definitions.

use std::time::Duration;

use common::{unit, DateTime, DateTimeOf};
use derive_more::{AsRef, Display, Error, From, FromStr};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::domain::User;
use crate::domain::user;

/// User session carried by a signed stateless token.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Session {
    /// ID of the [`User`] this [`Session`] belongs to.
    #[serde(rename = "sub")]
    pub user_id: user::Id,

    /// [`DateTime`] when this [`Session`] was issued.
    #[serde(rename = "iat", with = "common::datetime::serde::unix_timestamp")]
    pub issued_at: IssueDateTime,

    /// [`DateTime`] when this [`Session`] expires.
    #[serde(rename = "exp", with = "common::datetime::serde::unix_timestamp")]
    pub expires_at: ExpirationDateTime,

    /// [`Purpose`] this [`Session`]'s token was issued for.
    pub purpose: Purpose,
}

impl Session {
    /// Creates a new [`Session`] for the provided [`User`] expiring in `ttl`
    /// from now.
    #[must_use]
    pub fn new(user_id: user::Id, purpose: Purpose, ttl: Duration) -> Self {
        let now = DateTime::now();
        Self {
            user_id,
            issued_at: now.coerce(),
            expires_at: (now + ttl).coerce(),
            purpose,
        }
    }

    /// Encodes this [`Session`] into a signed [`Token`].
    ///
    /// # Errors
    ///
    /// Errors if signing fails.
    pub fn encode(
        &self,
        key: &EncodingKey,
    ) -> Result<Token, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::default(), self, key).map(|token| {
            // SAFETY: `jsonwebtoken::encode` always returns a valid `Token`.
            #[expect(unsafe_code, reason = "invariants are preserved")]
            unsafe {
                Token::new_unchecked(token)
            }
        })
    }

    /// Decodes a [`Session`] from the provided [`Token`], verifying its
    /// signature, expiry (with zero leeway) and [`Purpose`].
    ///
    /// A token issued for another [`Purpose`] never decodes successfully, so
    /// a refresh token cannot be replayed as an access token (or vice
    /// versa).
    ///
    /// # Errors
    ///
    /// Errors if the [`Token`] is malformed, wrongly signed, expired, or
    /// issued for another [`Purpose`].
    pub fn decode(
        token: &Token,
        purpose: Purpose,
        key: &DecodingKey,
    ) -> Result<Self, DecodeError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let session =
            jsonwebtoken::decode::<Self>(token.as_ref(), key, &validation)
                .map_err(DecodeError::Jwt)?
                .claims;
        if session.purpose != purpose {
            return Err(DecodeError::WrongPurpose {
                expected: purpose,
                actual: session.purpose,
            });
        }
        Ok(session)
    }
}

/// Error of decoding a [`Session`] from a [`Token`].
#[derive(Clone, Debug, Display, Error, From)]
pub enum DecodeError {
    /// [`Token`] is malformed, wrongly signed or expired.
    #[display("Failed to decode a JSON Web Token: {_0}")]
    Jwt(jsonwebtoken::errors::Error),

    /// [`Token`] was issued for another [`Purpose`].
    #[display("Token issued for `{actual}` cannot be used as `{expected}`")]
    WrongPurpose {
        /// [`Purpose`] the [`Token`] was expected to carry.
        expected: Purpose,

        /// [`Purpose`] the [`Token`] actually carries.
        actual: Purpose,
    },
}

impl DecodeError {
    /// Indicates whether this [`DecodeError`] represents an expired [`Token`].
    #[must_use]
    pub fn is_expiration(&self) -> bool {
        match self {
            Self::Jwt(e) => matches!(
                e.kind(),
                jsonwebtoken::errors::ErrorKind::ExpiredSignature,
            ),
            Self::WrongPurpose { .. } => false,
        }
    }
}

/// Purpose a [`Session`] [`Token`] is issued for.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Short-lived credential authenticating regular requests.
    #[display("access")]
    Access,

    /// Long-lived credential used solely to mint new access tokens.
    #[display("refresh")]
    Refresh,
}

/// Signed token of a [`Session`].
#[derive(AsRef, Clone, Debug, Display, FromStr)]
pub struct Token(String);

impl Token {
    /// Creates a new [`Token`] without checking its contents.
    ///
    /// # Safety
    ///
    /// The provided `token` must be a valid [`Token`] representation.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub const unsafe fn new_unchecked(token: String) -> Self {
        Self(token)
    }
}

/// Freshly issued pair of access and refresh [`Token`]s.
#[derive(Clone, Debug)]
pub struct TokenPair {
    /// Access [`Token`] of the pair.
    pub access: Token,

    /// Refresh [`Token`] of the pair.
    pub refresh: Token,

    /// [`DateTime`] when the [`TokenPair::access`] token expires.
    pub access_expires_at: ExpirationDateTime,

    /// [`DateTime`] when the [`TokenPair::refresh`] token expires.
    pub refresh_expires_at: ExpirationDateTime,
}

impl TokenPair {
    /// Issues a new [`TokenPair`] for the provided [`User`].
    ///
    /// # Errors
    ///
    /// Errors if signing either [`Token`] fails.
    pub fn issue(
        user_id: user::Id,
        config: &crate::Config,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let access =
            Session::new(user_id, Purpose::Access, config.access_token_ttl);
        let refresh =
            Session::new(user_id, Purpose::Refresh, config.refresh_token_ttl);
        Ok(Self {
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            access: access.encode(&config.jwt_encoding_key)?,
            refresh: refresh.encode(&config.jwt_encoding_key)?,
        })
    }
}

/// [`DateTime`] of a [`Session`] issuance.
pub type IssueDateTime = DateTimeOf<(Session, unit::Creation)>;

/// [`DateTime`] of a [`Session`] expiration.
pub type ExpirationDateTime = DateTimeOf<(Session, unit::Expiration)>;

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::DateTime;
    use jsonwebtoken::{DecodingKey, EncodingKey};

    use super::{DecodeError, Purpose, Session};
    use crate::domain::user;

    fn keys() -> (EncodingKey, DecodingKey) {
        (
            EncodingKey::from_secret(b"secret"),
            DecodingKey::from_secret(b"secret"),
        )
    }

    #[test]
    fn decodes_own_subject() {
        let (enc, dec) = keys();
        let user_id = user::Id::new();

        let token = Session::new(
            user_id,
            Purpose::Access,
            Duration::from_secs(60),
        )
        .encode(&enc)
        .unwrap();

        let session = Session::decode(&token, Purpose::Access, &dec).unwrap();
        assert_eq!(session.user_id, user_id);
    }

    #[test]
    fn refresh_token_never_authenticates_as_access() {
        let (enc, dec) = keys();

        let token = Session::new(
            user::Id::new(),
            Purpose::Refresh,
            Duration::from_secs(60),
        )
        .encode(&enc)
        .unwrap();

        match Session::decode(&token, Purpose::Access, &dec) {
            Err(DecodeError::WrongPurpose { expected, actual }) => {
                assert_eq!(expected, Purpose::Access);
                assert_eq!(actual, Purpose::Refresh);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn expired_token_fails_with_expiration() {
        let (enc, dec) = keys();

        let now = DateTime::now();
        let session = Session {
            user_id: user::Id::new(),
            issued_at: (now - Duration::from_secs(120)).coerce(),
            expires_at: (now - Duration::from_secs(60)).coerce(),
            purpose: Purpose::Access,
        };
        let token = session.encode(&enc).unwrap();

        let err =
            Session::decode(&token, Purpose::Access, &dec).unwrap_err();
        assert!(err.is_expiration());
    }
}
