//! Response caching middleware.
//!
//! Read routes are wrapped by [`read`], which short-circuits with the
//! bit-identical cached body on a hit and stores successful response bodies
//! on a miss. Mutating routes are wrapped by [`invalidate`], which evicts the
//! affected key families unconditionally BEFORE the handler runs, so a
//! failed mutation still costs the cached entries.
//!
//! A failing [`Cache`] backend degrades to calling the handler directly. It
//! is logged and never surfaced to the client.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse as _, Response},
    Extension,
};
use common::DateTime;
use derive_more::{Display, Error as StdError};
use tracing as log;

use crate::{AppState, Error as ApiError, Session};

/// Contract of a response cache backend.
pub trait Cache: fmt::Debug + Send + Sync {
    /// Looks up the cached body stored under the provided `key`.
    ///
    /// # Errors
    ///
    /// Errors if the backend is unavailable.
    fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    /// Stores the provided `body` under the provided `key`, expiring `ttl`
    /// from now.
    ///
    /// # Errors
    ///
    /// Errors if the backend is unavailable.
    fn set(&self, key: &str, body: Bytes, ttl: Duration) -> Result<(), Error>;

    /// Evicts every entry whose key starts with the provided `prefix`.
    ///
    /// # Errors
    ///
    /// Errors if the backend is unavailable.
    fn invalidate(&self, prefix: &str) -> Result<(), Error>;
}

/// Shared [`Cache`] backend.
pub type Shared = Arc<dyn Cache>;

/// Error of a [`Cache`] backend operation.
#[derive(Clone, Debug, Display, StdError)]
#[display("cache backend unavailable: {_0}")]
pub struct Error(#[error(not(source))] pub String);

/// In-memory [`Cache`] backend.
#[derive(Debug, Default)]
pub struct InMemory {
    /// Cached entries by key.
    entries: Mutex<HashMap<String, Entry>>,
}

/// Single entry of an [`InMemory`] cache.
#[derive(Debug)]
struct Entry {
    /// Cached response body.
    body: Bytes,

    /// [`DateTime`] when this [`Entry`] lapses.
    expires_at: DateTime,
}

impl Cache for InMemory {
    fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error("lock poisoned".into()))?;

        // Lazy expiry: lapsed entries are dropped on lookup.
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= DateTime::now() {
                drop(entries.remove(key));
                return Ok(None);
            }
            return Ok(Some(entry.body.clone()));
        }
        Ok(None)
    }

    fn set(&self, key: &str, body: Bytes, ttl: Duration) -> Result<(), Error> {
        drop(
            self.entries
                .lock()
                .map_err(|_| Error("lock poisoned".into()))?
                .insert(
                    key.to_owned(),
                    Entry {
                        body,
                        expires_at: DateTime::now() + ttl,
                    },
                ),
        );
        Ok(())
    }

    fn invalidate(&self, prefix: &str) -> Result<(), Error> {
        self.entries
            .lock()
            .map_err(|_| Error("lock poisoned".into()))?
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// Policy of the [`read`] middleware for a single route.
#[derive(Clone, Copy, Debug)]
pub struct ReadPolicy {
    /// Key prefix the route caches under.
    pub prefix: &'static str,

    /// [`Suffix`] appended to the prefix to form the full key.
    pub suffix: Suffix,
}

/// Key suffix strategy of a [`ReadPolicy`].
#[derive(Clone, Copy, Debug)]
pub enum Suffix {
    /// The prefix alone is the full key.
    None,

    /// Lowercased last path segment of the request.
    PathTail,

    /// ID of the authenticated caller.
    Caller,
}

impl ReadPolicy {
    /// Computes the full cache key for the provided request.
    ///
    /// [`None`] is returned if the key cannot be computed, in which case
    /// caching is skipped for the request.
    fn key(&self, req: &Request) -> Option<String> {
        match self.suffix {
            Suffix::None => Some(self.prefix.to_owned()),
            Suffix::PathTail => req
                .uri()
                .path()
                .rsplit('/')
                .next()
                .map(|tail| format!("{}{}", self.prefix, tail.to_lowercase())),
            Suffix::Caller => req
                .extensions()
                .get::<Session>()
                .map(|s| format!("{}{}", self.prefix, s.user_id)),
        }
    }
}

/// Middleware serving a route from the [`Cache`].
///
/// Requires an [`Extension`] with the route's [`ReadPolicy`].
pub async fn read(
    State(state): State<AppState>,
    Extension(policy): Extension<ReadPolicy>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = policy.key(&req) else {
        return next.run(req).await;
    };

    match state.cache.get(&key) {
        Ok(Some(body)) => {
            return (
                [(http::header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response();
        }
        Ok(None) => {}
        Err(e) => {
            log::warn!("cache lookup of `{key}` failed: {e}");
            return next.run(req).await;
        }
    }

    let resp = next.run(req).await;
    if !resp.status().is_success() {
        return resp;
    }

    let (parts, body) = resp.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::internal(&e).into_response();
        }
    };
    if let Err(e) = state.cache.set(&key, bytes.clone(), state.cache_ttl) {
        log::warn!("cache store of `{key}` failed: {e}");
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Policy of the [`invalidate`] middleware for a single route.
#[derive(Clone, Copy, Debug)]
pub struct InvalidatePolicy {
    /// Key prefixes to evict.
    pub prefixes: &'static [&'static str],

    /// Prefix of the per-caller key family to evict for the authenticated
    /// caller (if any).
    pub caller: Option<&'static str>,
}

/// Middleware evicting [`Cache`] key families touched by a mutating route.
///
/// Eviction happens before the handler runs and regardless of its outcome.
/// Requires an [`Extension`] with the route's [`InvalidatePolicy`].
pub async fn invalidate(
    State(state): State<AppState>,
    Extension(policy): Extension<InvalidatePolicy>,
    req: Request,
    next: Next,
) -> Response {
    for prefix in policy.prefixes {
        if let Err(e) = state.cache.invalidate(prefix) {
            log::warn!("cache eviction of `{prefix}*` failed: {e}");
        }
    }
    if let Some(prefix) = policy.caller {
        if let Some(session) = req.extensions().get::<Session>() {
            let key = format!("{prefix}{}", session.user_id);
            if let Err(e) = state.cache.invalidate(&key) {
                log::warn!("cache eviction of `{key}` failed: {e}");
            }
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use axum::body::Bytes;

    use super::{Cache as _, InMemory};

    #[test]
    fn expires_entries_after_ttl() {
        let cache = InMemory::default();
        cache
            .set("products_all", Bytes::from_static(b"[]"), Duration::ZERO)
            .unwrap();

        assert_eq!(cache.get("products_all").unwrap(), None);
    }

    #[test]
    fn invalidates_by_prefix_only() {
        let cache = InMemory::default();
        let ttl = Duration::from_secs(60);
        cache
            .set("product_1", Bytes::from_static(b"a"), ttl)
            .unwrap();
        cache
            .set("product_2", Bytes::from_static(b"b"), ttl)
            .unwrap();
        cache
            .set("products_all", Bytes::from_static(b"c"), ttl)
            .unwrap();

        cache.invalidate("product_").unwrap();

        assert_eq!(cache.get("product_1").unwrap(), None);
        assert_eq!(cache.get("product_2").unwrap(), None);
        assert_eq!(
            cache.get("products_all").unwrap(),
            Some(Bytes::from_static(b"c")),
        );
    }
}
