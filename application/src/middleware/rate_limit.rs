//! Fixed-window rate limiting middleware.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use axum_client_ip::{SecureClientIp, SecureClientIpSource};
use derive_more::{Display, Error as StdError};
use tracing as log;

use crate::{define_error, AppState, Error as ApiError};

/// Fixed-window rate limiter keyed by client identity.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Admission [`Policies`] of this [`RateLimiter`].
    policies: Policies,

    /// [`SecureClientIpSource`] the client identity is derived from.
    ///
    /// Identity must never come from a client-controlled value: behind the
    /// single trusted proxy hop this is the rightmost forwarding entry (the
    /// one appended by that hop), and for directly served clients the peer
    /// address of the connection.
    source: SecureClientIpSource,

    /// Per-identity admission windows.
    windows: Arc<Mutex<HashMap<(IpAddr, Kind), Window>>>,
}

/// Admission [`Policy`] set of a [`RateLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct Policies {
    /// [`Policy`] of sensitive routes.
    pub default: Policy,

    /// Stricter [`Policy`] of the session refresh route.
    pub refresh: Policy,
}

/// Single admission policy of a [`RateLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct Policy {
    /// Most admissions a single identity gets per window.
    pub ceiling: u32,

    /// Length of the admission window.
    pub window: Duration,
}

/// [`Policy`] selector of a route.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind {
    /// Default policy of sensitive routes.
    Default,

    /// Stricter policy of the session refresh route.
    Refresh,
}

/// Admission window of a single identity.
#[derive(Clone, Copy, Debug)]
struct Window {
    /// [`Instant`] when this [`Window`] started.
    started_at: Instant,

    /// Number of admissions within this [`Window`].
    admitted: u32,
}

/// Admission decision of a [`RateLimiter`].
#[derive(Clone, Copy, Debug)]
pub enum Decision {
    /// Request is admitted.
    Allowed,

    /// Request exceeds the [`Policy`] ceiling for the current window.
    Throttled,
}

/// Error of a [`RateLimiter`] admission check.
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Identity of the client could not be established.
    #[display("client identity unavailable")]
    NoIdentity,

    /// Counter storage was poisoned by a panicked holder.
    #[display("lock poisoned")]
    Poisoned,
}

impl RateLimiter {
    /// Creates a new [`RateLimiter`] with the provided [`Policies`],
    /// deriving client identities from the provided
    /// [`SecureClientIpSource`].
    #[must_use]
    pub fn new(policies: Policies, source: SecureClientIpSource) -> Self {
        Self {
            policies,
            source,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the [`Policy`] selected by the provided [`Kind`].
    #[must_use]
    pub fn policy(&self, kind: Kind) -> Policy {
        match kind {
            Kind::Default => self.policies.default,
            Kind::Refresh => self.policies.refresh,
        }
    }

    /// Checks whether a request of the provided identity is admitted under
    /// the [`Policy`] selected by the provided [`Kind`].
    ///
    /// Increment and check happen under one lock acquisition, so two
    /// concurrent requests of the same identity cannot both claim the last
    /// admission of a window.
    ///
    /// # Errors
    ///
    /// Errors if the counter storage is unavailable.
    pub fn allow(&self, ip: IpAddr, kind: Kind) -> Result<Decision, Error> {
        let policy = self.policy(kind);
        let now = Instant::now();

        let mut windows = self.windows.lock().map_err(|_| Error::Poisoned)?;
        let window = windows.entry((ip, kind)).or_insert(Window {
            started_at: now,
            admitted: 0,
        });
        if now.duration_since(window.started_at) >= policy.window {
            *window = Window {
                started_at: now,
                admitted: 0,
            };
        }

        if window.admitted >= policy.ceiling {
            return Ok(Decision::Throttled);
        }
        window.admitted += 1;
        Ok(Decision::Allowed)
    }
}

/// Middleware admitting a route's requests through the [`RateLimiter`].
///
/// The identity is the client network address taken from the configured
/// [`SecureClientIpSource`], never from a spoofable client-supplied value.
/// A failed admission check fails open under [`Kind::Default`] and closed
/// under [`Kind::Refresh`].
///
/// Requires an [`Extension`] with the route's [`Kind`].
pub async fn enforce(
    State(state): State<AppState>,
    Extension(kind): Extension<Kind>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = SecureClientIp::from(
        &state.limiter.source,
        req.headers(),
        req.extensions(),
    )
    .map_err(|_| Error::NoIdentity)
    .and_then(|SecureClientIp(ip)| state.limiter.allow(ip, kind));

    match decision {
        Ok(Decision::Allowed) => Ok(next.run(req).await),
        Ok(Decision::Throttled) => Err(ThrottleError::TooManyRequests.into()),
        Err(e) => match kind {
            Kind::Default => {
                log::warn!("rate limiter unavailable, admitting request: {e}");
                Ok(next.run(req).await)
            }
            Kind::Refresh => {
                log::warn!("rate limiter unavailable, rejecting refresh: {e}");
                Err(ThrottleError::Unavailable.into())
            }
        },
    }
}

define_error! {
    enum ThrottleError {
        #[code = "TOO_MANY_REQUESTS"]
        #[status = TOO_MANY_REQUESTS]
        #[message = "Too many requests, please try again later"]
        TooManyRequests,

        #[code = "SERVICE_UNAVAILABLE"]
        #[status = SERVICE_UNAVAILABLE]
        #[message = "Service temporarily unavailable"]
        Unavailable,
    }
}

#[cfg(test)]
mod spec {
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use axum_client_ip::SecureClientIpSource;

    use super::{Decision, Kind, Policies, Policy, RateLimiter};

    fn limiter(window: Duration) -> RateLimiter {
        RateLimiter::new(
            Policies {
                default: Policy { ceiling: 3, window },
                refresh: Policy { ceiling: 1, window },
            },
            SecureClientIpSource::ConnectInfo,
        )
    }

    #[test]
    fn admits_up_to_ceiling_then_throttles() {
        let limiter = limiter(Duration::from_secs(60));
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        for _ in 0..3 {
            assert!(matches!(
                limiter.allow(ip, Kind::Default).unwrap(),
                Decision::Allowed,
            ));
        }
        assert!(matches!(
            limiter.allow(ip, Kind::Default).unwrap(),
            Decision::Throttled,
        ));
    }

    #[test]
    fn counts_identities_and_policies_separately() {
        let limiter = limiter(Duration::from_secs(60));
        let first = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let second = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(matches!(
            limiter.allow(first, Kind::Refresh).unwrap(),
            Decision::Allowed,
        ));
        assert!(matches!(
            limiter.allow(first, Kind::Refresh).unwrap(),
            Decision::Throttled,
        ));
        // Another identity and another policy are unaffected.
        assert!(matches!(
            limiter.allow(second, Kind::Refresh).unwrap(),
            Decision::Allowed,
        ));
        assert!(matches!(
            limiter.allow(first, Kind::Default).unwrap(),
            Decision::Allowed,
        ));
    }

    #[test]
    fn window_lapse_resets_the_count() {
        let limiter = limiter(Duration::from_millis(20));
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        for _ in 0..3 {
            _ = limiter.allow(ip, Kind::Default).unwrap();
        }
        assert!(matches!(
            limiter.allow(ip, Kind::Default).unwrap(),
            Decision::Throttled,
        ));

        std::thread::sleep(Duration::from_millis(30));

        assert!(matches!(
            limiter.allow(ip, Kind::Default).unwrap(),
            Decision::Allowed,
        ));
    }
}
