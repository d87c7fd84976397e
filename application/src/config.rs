//! [`Config`]-related definitions.

use std::time;

use axum_client_ip::SecureClientIpSource;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use derive_more::Display;
use serde::Deserialize;
use smart_default::SmartDefault;

use crate::middleware::rate_limit;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Service configuration.
    pub service: Service,

    /// Response cache configuration.
    pub cache: Cache,

    /// Rate limiting configuration.
    pub rate_limit: RateLimit,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [`Environment`] the server runs in.
    pub environment: Environment,

    /// Source the client IP address is derived from for rate limiting.
    ///
    /// `ConnectInfo` (the peer address) suits direct deployments. Behind a
    /// single trusted reverse proxy set `RightmostXForwardedFor`, which reads
    /// the entry appended by that proxy and ignores the client-supplied rest
    /// of the header.
    #[default(SecureClientIpSource::ConnectInfo)]
    pub client_ip_source: SecureClientIpSource,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// Environment the server runs in.
///
/// Controls the `Secure` and `SameSite` attributes of the refresh token
/// cookie.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or staging deployment.
    #[default]
    #[display("development")]
    Development,

    /// Production deployment.
    #[display("production")]
    Production,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Service configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Service {
    /// [JWT] secret.
    ///
    /// [JWT]: https://wikipedia.org/wiki/JSON_Web_Token
    #[default("secret".to_owned())]
    pub jwt_secret: String,

    /// Lifetime of issued access tokens.
    #[default(time::Duration::from_secs(15 * 60))]
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: time::Duration,

    /// Lifetime of issued refresh tokens.
    #[default(time::Duration::from_secs(7 * 24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: time::Duration,

    /// Lifetime of issued account verification tokens.
    #[default(time::Duration::from_secs(24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub verification_token_ttl: time::Duration,

    /// Lifetime of issued password reset tokens.
    #[default(time::Duration::from_secs(60 * 60))]
    #[serde(with = "humantime_serde")]
    pub reset_token_ttl: time::Duration,
}

impl From<Service> for service::Config {
    fn from(value: Service) -> Self {
        let Service {
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            verification_token_ttl,
            reset_token_ttl,
        } = value;
        Self {
            jwt_encoding_key: jsonwebtoken::EncodingKey::from_secret(
                jwt_secret.as_bytes(),
            ),
            jwt_decoding_key: jsonwebtoken::DecodingKey::from_secret(
                jwt_secret.as_bytes(),
            ),
            access_token_ttl,
            refresh_token_ttl,
            verification_token_ttl,
            reset_token_ttl,
        }
    }
}

/// Response cache configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cache {
    /// TTL of cached response bodies.
    #[default(time::Duration::from_secs(5 * 60))]
    #[serde(with = "humantime_serde")]
    pub ttl: time::Duration,
}

/// Rate limiting configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct RateLimit {
    /// Policy of sensitive routes.
    #[default(Limit {
        max_requests: 10,
        window: time::Duration::from_secs(60),
    })]
    pub default: Limit,

    /// Stricter policy of the session refresh route.
    #[default(Limit {
        max_requests: 5,
        window: time::Duration::from_secs(15 * 60),
    })]
    pub refresh: Limit,
}

/// Single rate limiting policy.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Limit {
    /// Most requests a single client gets per window.
    pub max_requests: u32,

    /// Length of the window.
    #[serde(with = "humantime_serde")]
    pub window: time::Duration,
}

impl From<RateLimit> for rate_limit::Policies {
    fn from(value: RateLimit) -> Self {
        let RateLimit { default, refresh } = value;
        Self {
            default: default.into(),
            refresh: refresh.into(),
        }
    }
}

impl From<Limit> for rate_limit::Policy {
    fn from(value: Limit) -> Self {
        let Limit {
            max_requests,
            window,
        } = value;
        Self {
            ceiling: max_requests,
            window,
        }
    }
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}
