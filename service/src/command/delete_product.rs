//! [`Command`] for deleting a [`Product`].

use common::operations::{By, Delete};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{product, Product},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for deleting a [`Product`].
#[derive(Clone, Copy, Debug, From)]
pub struct DeleteProduct {
    /// ID of the [`Product`] to delete.
    pub id: product::Id,
}

impl<Db> Command<DeleteProduct> for Service<Db>
where
    Db: Database<
        Delete<By<Product, product::Id>>,
        Ok = Option<Product>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Product;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: DeleteProduct) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeleteProduct { id } = cmd;

        self.database()
            .execute(Delete(By::new(id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::ProductNotExists(id))
            .map_err(tracerr::wrap!())
    }
}

/// Error of [`DeleteProduct`] [`Command`] execution.
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
