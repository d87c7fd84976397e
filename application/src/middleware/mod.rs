//! Middleware layered over API routes.

pub mod cache;
pub mod rate_limit;
