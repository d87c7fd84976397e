//! [`Command`] for updating a [`Product`].

use common::operations::{By, Select, Update};
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

/// [`Command`] for updating a [`Product`].
///
/// Only the provided fields are changed, the rest keep their current values.
#[derive(Clone, Debug)]
pub struct UpdateProduct {
    /// ID of the [`Product`] to update.
    pub id: product::Id,

    /// New [`Name`] of the [`Product`].
    pub name: Option<product::Name>,

    /// New [`Description`] of the [`Product`].
    pub description: Option<product::Description>,

    /// New [`Price`] of the [`Product`].
    pub price: Option<product::Price>,

    /// New [`Category`] of the [`Product`].
    pub category: Option<product::Category>,

    /// New stock quantity of the [`Product`].
    pub stock: Option<u32>,

    /// New availability of the [`Product`].
    pub available: Option<bool>,
}

impl<Db> Command<UpdateProduct> for Service<Db>
where
    Db: Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = Product;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: UpdateProduct) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let UpdateProduct {
            id,
            name,
            description,
            price,
            category,
            stock,
            available,
        } = cmd;

        let mut product = self
            .database()
            .execute(Select(By::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::ProductNotExists(id))
            .map_err(tracerr::wrap!())?;

        if let Some(name) = name {
            product.name = name;
        }
        if let Some(description) = description {
            product.description = description;
        }
        if let Some(price) = price {
            product.price = price;
        }
        if let Some(category) = category {
            product.category = category;
        }
        if let Some(stock) = stock {
            product.stock = stock;
        }
        if let Some(available) = available {
            product.available = available;
        }

        self.database()
            .execute(Update(product.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        Ok(product)
    }
}

/// Error of [`UpdateProduct`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Product`] with the provided ID does not exist.
    #[display("`Product(id: {_0})` does not exist")]
    #[from(ignore)]
    ProductNotExists(#[error(not(source))] product::Id),
}
