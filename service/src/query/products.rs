//! [`Query`] collection related to multiple [`Product`]s.

use common::{operations::By, pagination::Page};

use crate::{domain::Product, read};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries a [`Page`] of [`Product`]s matching a
/// [`read::product::list::Selector`].
pub type List = DatabaseQuery<By<Page<Product>, read::product::list::Selector>>;
