//! Read models.

pub mod product;
