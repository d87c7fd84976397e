//! [`Command`] for creating a new [`Product`].

use common::{operations::Insert, DateTime};
use derive_more::{Display, Error, From};
use tracerr::Traced;

#[cfg(doc)]
use crate::domain::product::{Category, Description, Name, Price};
use crate::{
    domain::{product, Product},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for creating a new [`Product`].
#[derive(Clone, Debug)]
pub struct CreateProduct {
    /// [`Name`] of a new [`Product`].
    pub name: product::Name,

    /// [`Description`] of a new [`Product`].
    pub description: product::Description,

    /// [`Price`] of a new [`Product`].
    pub price: product::Price,

    /// [`Category`] of a new [`Product`].
    pub category: product::Category,

    /// Stock quantity of a new [`Product`].
    pub stock: u32,

    /// Indicator whether a new [`Product`] is available for sale.
    pub available: bool,
}

impl<Db> Command<CreateProduct> for Service<Db>
where
    Db: Database<Insert<Product>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = Product;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: CreateProduct) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateProduct {
            name,
            description,
            price,
            category,
            stock,
            available,
        } = cmd;

        let product = Product {
            id: product::Id::new(),
            name,
            description,
            price,
            category,
            stock,
            available,
            created_at: DateTime::now().coerce(),
        };

        self.database()
            .execute(Insert(product.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        Ok(product)
    }
}

/// Error of [`CreateProduct`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),
}
