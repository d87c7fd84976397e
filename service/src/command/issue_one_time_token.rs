//! [`Command`] for issuing a [`OneTime`] token.

use common::operations::{By, Select, Update};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        user::{self, one_time, OneTime},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for issuing a [`OneTime`] token.
///
/// Only one [`OneTime`] token per [`one_time::Purpose`] is kept for a
/// [`User`], so issuing a new one invalidates the previously issued token of
/// the same [`one_time::Purpose`].
#[derive(Clone, Debug)]
pub struct IssueOneTimeToken {
    /// [`User`] to issue a [`OneTime`] token for.
    pub recipient: Recipient,

    /// [`one_time::Purpose`] of the issued token.
    pub purpose: one_time::Purpose,
}

/// [`User`] a [`OneTime`] token is issued for.
#[derive(Clone, Debug, From)]
pub enum Recipient {
    /// Identified by its [`user::Id`].
    ById(user::Id),

    /// Identified by its [`user::Email`].
    ByEmail(user::Email),
}

/// Output of [`IssueOneTimeToken`] [`Command`].
#[derive(Clone, Debug)]
pub struct Output {
    /// [`User`] the token was issued for.
    pub user: User,

    /// Plaintext value of the issued token.
    ///
    /// Intended for out-of-band delivery only, and never returned again.
    pub token: one_time::Value,
}

impl<Db> Command<IssueOneTimeToken> for Service<Db>
where
    Db: Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + for<'e> Database<
            Select<By<Option<User>, &'e user::Email>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Update<User>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: IssueOneTimeToken,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let IssueOneTimeToken { recipient, purpose } = cmd;

        let mut user = match recipient {
            Recipient::ById(user_id) => self
                .database()
                .execute(Select(By::new(user_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or_else(|| E::UserNotExists(user_id))
                .map_err(tracerr::wrap!())?,
            Recipient::ByEmail(email) => self
                .database()
                .execute(Select(By::new(&email)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or_else(|| E::EmailNotExists(email))
                .map_err(tracerr::wrap!())?,
        };

        let token = match purpose {
            one_time::Purpose::Verification => {
                if user.is_verified {
                    return Err(tracerr::new!(E::AlreadyVerified(user.id)));
                }
                let token =
                    OneTime::generate(self.config().verification_token_ttl);
                user.verification = Some(token.clone());
                token
            }
            one_time::Purpose::PasswordReset => {
                let token = OneTime::generate(self.config().reset_token_ttl);
                user.password_reset = Some(token.clone());
                token
            }
        };

        self.database()
            .execute(Update(user.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        Ok(Output {
            user,
            token: token.value,
        })
    }
}

/// Error of [`IssueOneTimeToken`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`User`] is already verified, so no verification token can be issued
    /// for it.
    #[display("`User(id: {_0})` is already verified")]
    #[from(ignore)]
    AlreadyVerified(#[error(not(source))] user::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`User`] with the provided [`user::Email`] does not exist.
    #[display("`User(email: {_0})` does not exist")]
    #[from(ignore)]
    EmailNotExists(#[error(not(source))] user::Email),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    #[from(ignore)]
    UserNotExists(#[error(not(source))] user::Id),
}
