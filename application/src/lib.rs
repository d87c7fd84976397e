//! Application provides the REST API for interacting with the [`Service`].

#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod api;
pub mod args;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;

use std::{sync::Arc, time::Duration};

use serde::Serialize;
// Used in binary.
use tokio as _;
use tower_http as _;
use tracing_subscriber as _;

pub use self::{
    args::Args,
    config::Config,
    context::Session,
    error::{AsError, Error},
};

/// [`Service`] with filled infrastructure dependencies.
///
/// [`Service`]: service::Service
pub type Service = service::Service<service::infra::InMemory>;

/// Shared state of the application.
#[derive(Clone, Debug)]
pub struct AppState {
    /// [`Service`] instance.
    pub service: Service,

    /// Response [`Cache`] backend.
    ///
    /// [`Cache`]: middleware::cache::Cache
    pub cache: middleware::cache::Shared,

    /// TTL of cached response bodies.
    pub cache_ttl: Duration,

    /// [`RateLimiter`] of sensitive endpoints.
    ///
    /// [`RateLimiter`]: middleware::rate_limit::RateLimiter
    pub limiter: middleware::rate_limit::RateLimiter,

    /// [`Environment`] the application runs in.
    ///
    /// [`Environment`]: config::Environment
    pub environment: config::Environment,
}

impl AppState {
    /// Creates a new [`AppState`] out of the provided [`Config`].
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            service: Service::new(
                config.service.clone().into(),
                service::infra::InMemory::default(),
            ),
            cache: Arc::new(middleware::cache::InMemory::default()),
            cache_ttl: config.cache.ttl,
            limiter: middleware::rate_limit::RateLimiter::new(
                config.rate_limit.into(),
                config.server.client_ip_source.clone(),
            ),
            environment: config.server.environment,
        }
    }
}

/// Uniform JSON envelope of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T = ()> {
    /// Indicator whether the request succeeded.
    pub success: bool,

    /// Human-readable message describing the outcome.
    pub message: String,

    /// Payload of the response (if any).
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Creates a new successful [`Envelope`] carrying the provided `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Creates a new failed [`Envelope`] with no payload.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl Envelope {
    /// Creates a new successful [`Envelope`] with no payload.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
