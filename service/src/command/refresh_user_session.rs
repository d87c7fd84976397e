//! [`Command`] for refreshing a [`Session`].

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, session, session::TokenPair, Session},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for refreshing a [`Session`].
///
/// A valid refresh [`session::Token`] is exchanged for a whole new
/// [`TokenPair`], so each refresh rotates the refresh token along with the
/// access one.
#[derive(Clone, Debug, From)]
pub struct RefreshUserSession {
    /// Refresh [`session::Token`] to exchange.
    pub token: session::Token,
}

/// Output of [`RefreshUserSession`] [`Command`].
#[derive(Clone, Debug)]
pub struct Output {
    /// Freshly issued [`TokenPair`].
    pub tokens: TokenPair,

    /// [`User`] whose [`Session`] has been refreshed.
    pub user: User,
}

impl<Db> Command<RefreshUserSession> for Service<Db>
where
    Db: Database<
        Select<By<Option<User>, user::Id>>,
        Ok = Option<User>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: RefreshUserSession,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RefreshUserSession { token } = cmd;

        let session = Session::decode(
            &token,
            session::Purpose::Refresh,
            &self.config().jwt_decoding_key,
        )
        .map_err(tracerr::from_and_wrap!(=> E))?;

        let user = self
            .database()
            .execute(Select(By::new(session.user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::UserNotExists(session.user_id))
            .map_err(tracerr::wrap!())?;

        let tokens = TokenPair::issue(user.id, self.config())
            .map_err(tracerr::from_and_wrap!(=> E))?;

        Ok(Output { tokens, user })
    }
}

/// Error of [`RefreshUserSession`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`session::Token`] failed to decode.
    #[display("Failed to decode a `Session` token: {_0}")]
    InvalidToken(session::DecodeError),

    /// [`jsonwebtoken`] encoding error.
    #[display("Failed to encode a JSON Web Token: {_0}")]
    JsonWebTokenEncodeError(jsonwebtoken::errors::Error),

    /// [`User`] the [`Session`] belongs to does not exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),
}
