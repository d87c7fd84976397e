//! [`Command`] for creating a new [`User`].

use common::{operations::Insert, DateTime};
use derive_more::{Display, Error, From};
use secrecy::{ExposeSecret, SecretBox};
use tracerr::Traced;

#[cfg(doc)]
use crate::domain::user::{Email, Name, Password, Phone};
use crate::{
    domain::{
        user::{self, one_time, OneTime},
        User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for creating a new [`User`].
#[derive(Clone, Debug)]
pub struct CreateUser {
    /// [`Name`] of a new [`User`].
    pub name: user::Name,

    /// [`Email`] of a new [`User`].
    pub email: user::Email,

    /// [`Password`] of a new [`User`].
    pub password: SecretBox<user::Password>,

    /// [`Phone`] of a new [`User`].
    pub phone: Option<user::Phone>,

    /// Birth date of a new [`User`].
    pub date_of_birth: Option<user::BirthDateTime>,
}

/// Output of [`CreateUser`] [`Command`].
#[derive(Clone, Debug)]
pub struct Output {
    /// Created [`User`].
    pub user: User,

    /// Plaintext account verification token of the created [`User`].
    ///
    /// Intended for out-of-band delivery only, and never returned again.
    pub verification_token: one_time::Value,
}

impl<Db> Command<CreateUser> for Service<Db>
where
    Db: Database<
        Insert<database::NewUser>,
        Ok = database::Insertion,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: CreateUser) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateUser {
            name,
            email,
            password,
            phone,
            date_of_birth,
        } = cmd;

        let verification =
            OneTime::generate(self.config().verification_token_ttl);
        let user = User {
            id: user::Id::new(),
            name,
            email,
            password_hash: user::PasswordHash::new(password.expose_secret())
                .map_err(tracerr::from_and_wrap!(=> E))?,
            phone,
            date_of_birth,
            role: user::Role::Public,
            is_verified: false,
            is_onboarded: false,
            verification: Some(verification.clone()),
            password_reset: None,
            created_at: DateTime::now().coerce(),
        };

        // Occupancy check and insert happen as one store operation, so two
        // concurrent registrations of the same email cannot both succeed.
        let inserted = self
            .database()
            .execute(Insert(database::NewUser(user.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        match inserted {
            database::Insertion::Inserted => Ok(Output {
                user,
                verification_token: verification.value,
            }),
            database::Insertion::EmailOccupied => {
                Err(tracerr::new!(E::EmailOccupied(user.email)))
            }
        }
    }
}

/// Error of [`CreateUser`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`user::Email`] is already occupied.
    #[display("`{_0}` email is occupied")]
    EmailOccupied(#[error(not(source))] user::Email),

    /// Failed to hash the provided [`Password`].
    #[display("Failed to hash password: {_0}")]
    #[from]
    HashPassword(#[error(not(source))] argon2::password_hash::Error),
}
