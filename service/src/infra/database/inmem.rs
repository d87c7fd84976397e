//! In-memory [`Database`] implementation.
//!
//! Reference store used where the real record store is out of reach: local
//! runs and tests. Every operation takes the process-wide lock for its whole
//! duration, so each one is applied atomically and no partial state is ever
//! visible to concurrent operations.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use common::{
    operations::{By, Delete, Insert, Select, Update},
    pagination::Page,
    DateTime,
};
use derive_more::{Display, Error as StdError};
use tracerr::Traced;

use crate::{
    domain::{
        product,
        user::{self, one_time},
        Product, User,
    },
    infra::{
        database::{self, ConsumeOneTime, Consumption, Insertion, NewUser},
        Database,
    },
    read,
};

/// In-memory [`Database`].
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    /// Shared state of this [`InMemory`] database.
    state: Arc<RwLock<State>>,
}

/// State of an [`InMemory`] database.
#[derive(Debug, Default)]
struct State {
    /// Stored [`User`]s.
    users: HashMap<user::Id, User>,

    /// Stored [`Product`]s.
    products: HashMap<product::Id, Product>,
}

impl InMemory {
    /// Acquires the shared lock of this [`InMemory`] database.
    fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, State>, Traced<database::Error>> {
        self.state
            .read()
            .map_err(|_| tracerr::new!(database::Error::from(Error::Poisoned)))
    }

    /// Acquires the exclusive lock of this [`InMemory`] database.
    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, State>, Traced<database::Error>> {
        self.state
            .write()
            .map_err(|_| tracerr::new!(database::Error::from(Error::Poisoned)))
    }
}

/// Error of an [`InMemory`] database operation.
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Shared lock was poisoned by a panicked writer.
    #[display("lock poisoned")]
    Poisoned,
}

impl Database<Select<By<Option<User>, user::Id>>> for InMemory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.read()?.users.get(&by.into_inner()).cloned())
    }
}

impl<'e> Database<Select<By<Option<User>, &'e user::Email>>> for InMemory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, &'e user::Email>>,
    ) -> Result<Self::Ok, Self::Err> {
        let email = by.into_inner();
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email == *email)
            .cloned())
    }
}

impl Database<Insert<NewUser>> for InMemory {
    type Ok = Insertion;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(NewUser(user)): Insert<NewUser>,
    ) -> Result<Self::Ok, Self::Err> {
        // Single critical section: occupancy check and insert happen under
        // one exclusive lock acquisition.
        let mut state = self.write()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Ok(Insertion::EmailOccupied);
        }
        drop(state.users.insert(user.id, user));
        Ok(Insertion::Inserted)
    }
}

impl Database<Update<User>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(user): Update<User>,
    ) -> Result<Self::Ok, Self::Err> {
        drop(self.write()?.users.insert(user.id, user));
        Ok(())
    }
}

impl Database<Update<ConsumeOneTime>> for InMemory {
    type Ok = Consumption;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(consume): Update<ConsumeOneTime>,
    ) -> Result<Self::Ok, Self::Err> {
        let ConsumeOneTime {
            user_id,
            purpose,
            candidate,
            new_password_hash,
        } = consume;

        // Single critical section: validation and clearing happen under one
        // exclusive lock acquisition.
        let mut state = self.write()?;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(Consumption::NoUser);
        };

        let slot = match purpose {
            one_time::Purpose::Verification => &mut user.verification,
            one_time::Purpose::PasswordReset => &mut user.password_reset,
        };
        let Some(token) = slot.as_ref() else {
            return Ok(Consumption::NoToken);
        };
        // Equality is checked before expiry: an expired token fails even on
        // an exact match.
        if !token.matches(&candidate) {
            return Ok(Consumption::Mismatch);
        }
        if token.is_expired_at(DateTime::now()) {
            return Ok(Consumption::Expired);
        }

        *slot = None;
        match purpose {
            one_time::Purpose::Verification => {
                user.is_verified = true;
            }
            one_time::Purpose::PasswordReset => {
                if let Some(hash) = new_password_hash {
                    user.password_hash = hash;
                }
            }
        }
        Ok(Consumption::Consumed(user.clone()))
    }
}

impl Database<Select<By<Option<Product>, product::Id>>> for InMemory {
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.read()?.products.get(&by.into_inner()).cloned())
    }
}

impl Database<Select<By<Page<Product>, read::product::list::Selector>>>
    for InMemory
{
    type Ok = Page<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Page<Product>, read::product::list::Selector>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::product::list::Selector { filter, page } = by.into_inner();

        let mut matching = self
            .read()?
            .products
            .values()
            .filter(|p| {
                filter.category.as_ref().is_none_or(|c| p.category == *c)
            })
            .filter(|p| {
                filter.search.as_ref().is_none_or(|term| {
                    let name: &str = p.name.as_ref();
                    // Categories are stored lowercased already.
                    let category: &str = p.category.as_ref();
                    name.to_lowercase().contains(term.as_str())
                        || category.contains(term.as_str())
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(Page::new(page, items, total))
    }
}

impl Database<Insert<Product>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(product): Insert<Product>,
    ) -> Result<Self::Ok, Self::Err> {
        drop(self.write()?.products.insert(product.id, product));
        Ok(())
    }
}

impl Database<Update<Product>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(product): Update<Product>,
    ) -> Result<Self::Ok, Self::Err> {
        drop(self.write()?.products.insert(product.id, product));
        Ok(())
    }
}

impl Database<Delete<By<Product, product::Id>>> for InMemory {
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Product, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.write()?.products.remove(&by.into_inner()))
    }
}

#[cfg(test)]
mod insert_new_user_spec {
    use common::{
        operations::{By, Insert, Select},
        DateTime,
    };

    use super::{InMemory, Insertion, NewUser};
    use crate::{
        domain::{user, User},
        infra::Database,
    };

    fn user(email: &str) -> User {
        User {
            id: user::Id::new(),
            name: user::Name::new("Jamie Doe").unwrap(),
            email: user::Email::new(email).unwrap(),
            password_hash: user::PasswordHash::new(
                &user::Password::new("hunter2hunter2").unwrap(),
            )
            .unwrap(),
            phone: None,
            date_of_birth: None,
            role: user::Role::Public,
            is_verified: false,
            is_onboarded: false,
            verification: None,
            password_reset: None,
            created_at: DateTime::now().coerce(),
        }
    }

    #[tokio::test]
    async fn rejects_occupied_email() {
        let db = InMemory::default();
        let first = user("jamie@example.com");
        let second = user("jamie@example.com");

        assert!(matches!(
            db.execute(Insert(NewUser(first.clone()))).await.unwrap(),
            Insertion::Inserted,
        ));
        assert!(matches!(
            db.execute(Insert(NewUser(second))).await.unwrap(),
            Insertion::EmailOccupied,
        ));

        // The original record stays untouched.
        let stored = db
            .execute(Select(By::new(first.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first.id);
    }
}

#[cfg(test)]
mod consume_one_time_spec {
    use std::time::Duration;

    use common::{
        operations::{Insert, Update},
        DateTime,
    };

    use super::{Consumption, InMemory};
    use crate::{
        domain::{
            user::{self, one_time, OneTime},
            User,
        },
        infra::{
            database::{ConsumeOneTime, NewUser},
            Database,
        },
    };

    fn user_with_verification(token: OneTime) -> User {
        User {
            id: user::Id::new(),
            name: user::Name::new("Jamie Doe").unwrap(),
            email: user::Email::new("jamie@example.com").unwrap(),
            password_hash: user::PasswordHash::new(
                &user::Password::new("hunter2hunter2").unwrap(),
            )
            .unwrap(),
            phone: None,
            date_of_birth: None,
            role: user::Role::Public,
            is_verified: false,
            is_onboarded: false,
            verification: Some(token),
            password_reset: None,
            created_at: DateTime::now().coerce(),
        }
    }

    fn consume(user_id: user::Id, candidate: one_time::Value) -> ConsumeOneTime {
        ConsumeOneTime {
            user_id,
            purpose: one_time::Purpose::Verification,
            candidate,
            new_password_hash: None,
        }
    }

    #[tokio::test]
    async fn succeeds_at_most_once() {
        let db = InMemory::default();
        let token = OneTime::generate(Duration::from_secs(60));
        let user = user_with_verification(token.clone());
        _ = db.execute(Insert(NewUser(user.clone()))).await.unwrap();

        match db
            .execute(Update(consume(user.id, token.value.clone())))
            .await
            .unwrap()
        {
            Consumption::Consumed(u) => {
                assert!(u.is_verified);
                assert!(u.verification.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Second attempt with the very same value.
        assert!(matches!(
            db.execute(Update(consume(user.id, token.value)))
                .await
                .unwrap(),
            Consumption::NoToken,
        ));
    }

    #[tokio::test]
    async fn expired_token_fails_even_on_exact_match() {
        let db = InMemory::default();
        let mut token = OneTime::generate(Duration::from_secs(60));
        token.expires_at =
            (DateTime::now() - Duration::from_secs(1)).coerce();
        let user = user_with_verification(token.clone());
        _ = db.execute(Insert(NewUser(user.clone()))).await.unwrap();

        assert!(matches!(
            db.execute(Update(consume(user.id, token.value)))
                .await
                .unwrap(),
            Consumption::Expired,
        ));
    }

    #[tokio::test]
    async fn mismatch_leaves_token_intact() {
        let db = InMemory::default();
        let token = OneTime::generate(Duration::from_secs(60));
        let user = user_with_verification(token.clone());
        _ = db.execute(Insert(NewUser(user.clone()))).await.unwrap();

        assert!(matches!(
            db.execute(Update(consume(user.id, one_time::Value::random())))
                .await
                .unwrap(),
            Consumption::Mismatch,
        ));

        // The stored token survives a failed attempt.
        assert!(matches!(
            db.execute(Update(consume(user.id, token.value)))
                .await
                .unwrap(),
            Consumption::Consumed(_),
        ));
    }

    #[tokio::test]
    async fn reissuing_invalidates_previous_token() {
        let db = InMemory::default();
        let old = OneTime::generate(Duration::from_secs(60));
        let mut user = user_with_verification(old.clone());
        _ = db.execute(Insert(NewUser(user.clone()))).await.unwrap();

        let new = OneTime::generate(Duration::from_secs(60));
        user.verification = Some(new.clone());
        db.execute(Update(user.clone())).await.unwrap();

        assert!(matches!(
            db.execute(Update(consume(user.id, old.value)))
                .await
                .unwrap(),
            Consumption::Mismatch,
        ));
        assert!(matches!(
            db.execute(Update(consume(user.id, new.value)))
                .await
                .unwrap(),
            Consumption::Consumed(_),
        ));
    }
}
