//! End-to-end tests of the REST API.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use axum_client_ip::SecureClientIpSource;
use common::{operations::Insert, DateTime, Handler as _};
use http_body_util::BodyExt as _;
use serde_json::{json, Value};
use tower::ServiceExt as _;

use application::{api, config, AppState, Config};
use service::{
    domain::{user, User},
    infra::database::{Insertion, NewUser},
    query,
};

fn app() -> (AppState, Router) {
    let state = AppState::new(&Config::default());
    let router = api::router(state.clone());
    (state, router)
}

fn post(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    request("POST", uri, bearer, Some(body))
}

fn patch(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    request("PATCH", uri, bearer, Some(body))
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    request("GET", uri, bearer, None)
}

fn request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

/// Starts a refresh request of a client connected from the provided peer
/// address.
///
/// The server derives the rate limiting identity from the connection info, so
/// tests inject it the way `axum::serve` does.
fn refresh_from(peer: SocketAddr) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/api/v1/auth/refresh-token")
        .extension(ConnectInfo(peer))
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn register(router: &Router, email: &str, password: &str) {
    let resp = router
        .clone()
        .oneshot(post(
            "/api/v1/auth/create",
            None,
            json!({
                "name": "Jamie Doe",
                "email": email,
                "password": password,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    // Registration issues no tokens.
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
}

async fn login(router: &Router, email: &str, password: &str) -> (String, String) {
    let resp = router
        .clone()
        .oneshot(post(
            "/api/v1/auth/login",
            None,
            json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("refresh cookie is set")
        .to_str()
        .unwrap()
        .to_owned();
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let access = body["data"]["access_token"].as_str().unwrap().to_owned();
    let refresh = cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("refresh_token=")
        .to_owned();
    (access, refresh)
}

/// Seeds an `admin` account directly into the store.
async fn seed_admin(state: &AppState, email: &str, password: &str) {
    let admin = User {
        id: user::Id::new(),
        name: user::Name::new("Admin").unwrap(),
        email: user::Email::new(email).unwrap(),
        password_hash: user::PasswordHash::new(
            &user::Password::new(password).unwrap(),
        )
        .unwrap(),
        phone: None,
        date_of_birth: None,
        role: user::Role::Admin,
        is_verified: true,
        is_onboarded: true,
        verification: None,
        password_reset: None,
        created_at: DateTime::now().coerce(),
    };
    assert!(matches!(
        state
            .service
            .database()
            .execute(Insert(NewUser(admin)))
            .await
            .unwrap(),
        Insertion::Inserted,
    ));
}

async fn stored_user(state: &AppState, email: &str) -> User {
    let email = user::Email::new(email).unwrap();
    state
        .service
        .execute(query::user::ByEmail::by(&email))
        .await
        .unwrap()
        .expect("user is stored")
}

#[tokio::test]
async fn health_endpoint_reports_environment() {
    let (_, router) = app();

    let (status, body) = send(&router, get("/", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["environment"], "development");
}

#[tokio::test]
async fn registers_logs_in_and_serves_cached_user() {
    let (_, router) = app();
    register(&router, "jamie@example.com", "hunter2hunter2").await;

    // Duplicate email is rejected.
    let (status, body) = send(
        &router,
        post(
            "/api/v1/auth/create",
            None,
            json!({
                "name": "Jamie Doe",
                "email": "JAMIE@example.com",
                "password": "hunter2hunter2",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["success"], false);

    let (access, _) = login(&router, "jamie@example.com", "hunter2hunter2").await;

    // First read populates the cache, the second is served from it with the
    // bit-identical body.
    let first = router
        .clone()
        .oneshot(get("/api/v1/auth/user", Some(&access)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = first.into_body().collect().await.unwrap().to_bytes();

    let second = router
        .clone()
        .oneshot(get("/api/v1/auth/user", Some(&access)))
        .await
        .unwrap();
    let second = second.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(first, second);

    let body: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(body["data"]["user"]["email"], "jamie@example.com");
    assert_eq!(body["data"]["user"]["role"], "public");
    assert_eq!(body["data"]["user"]["is_verified"], false);
    assert_eq!(body["data"]["user"]["is_onboarded"], false);

    // Logging out clears the cookie, yet the still-valid access token keeps
    // authenticating until its own expiry.
    let (status, _) = send(
        &router,
        post("/api/v1/auth/logout", Some(&access), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get("/api/v1/auth/user", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rejects_wrong_credentials_and_missing_token() {
    let (_, router) = app();
    register(&router, "casey@example.com", "hunter2hunter2").await;

    let (status, body) = send(
        &router,
        post(
            "/api/v1/auth/login",
            None,
            json!({"email": "casey@example.com", "password": "wrong password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&router, get("/api/v1/auth/user", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refreshes_session_with_cookie_only() {
    let (_, router) = app();
    register(&router, "robin@example.com", "hunter2hunter2").await;
    let (_, refresh) = login(&router, "robin@example.com", "hunter2hunter2").await;
    let peer = SocketAddr::from(([10, 0, 0, 1], 40000));

    // No cookie at all.
    let resp = router
        .clone()
        .oneshot(refresh_from(peer).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // With the cookie the whole pair is rotated.
    let resp = router
        .clone()
        .oneshot(
            refresh_from(peer)
                .header(header::COOKIE, format!("refresh_token={refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("rotated refresh cookie is set")
        .to_str()
        .unwrap()
        .to_owned();
    assert!(rotated.starts_with("refresh_token="));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["data"]["access_token"].as_str().is_some());

    // An access token is not accepted in place of a refresh token.
    let (access, _) = login(&router, "robin@example.com", "hunter2hunter2").await;
    let resp = router
        .clone()
        .oneshot(
            refresh_from(peer)
                .header(header::COOKIE, format!("refresh_token={access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_endpoint_is_strictly_throttled() {
    let mut config = Config::default();
    config.rate_limit.refresh = config::Limit {
        max_requests: 2,
        window: std::time::Duration::from_secs(60),
    };
    let state = AppState::new(&config);
    let router = api::router(state);
    let peer = SocketAddr::from(([10, 1, 1, 1], 40000));

    // A directly connected client is identified by its peer address and is
    // admitted up to the ceiling.
    for _ in 0..2 {
        let resp = router
            .clone()
            .oneshot(refresh_from(peer).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = router
        .clone()
        .oneshot(refresh_from(peer).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // Unknown client identity fails closed on this endpoint.
    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/refresh-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn throttling_ignores_forged_forwarding_entries() {
    let mut config = Config::default();
    config.server.client_ip_source = SecureClientIpSource::RightmostXForwardedFor;
    config.rate_limit.refresh = config::Limit {
        max_requests: 2,
        window: std::time::Duration::from_secs(60),
    };
    let state = AppState::new(&config);
    let router = api::router(state);

    // Only the entry appended by the trusted proxy hop counts, so rotating
    // the client-supplied part of the header mints no fresh identities.
    for i in 0..3 {
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/refresh-token")
                    .header(
                        "X-Forwarded-For",
                        format!("198.51.100.{i}, 203.0.113.7"),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let expected = if i < 2 {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(resp.status(), expected);
    }
}

#[tokio::test]
async fn verifies_account_with_one_time_token() {
    let (state, router) = app();
    register(&router, "drew@example.com", "hunter2hunter2").await;
    let (access, _) = login(&router, "drew@example.com", "hunter2hunter2").await;

    let issued = stored_user(&state, "drew@example.com")
        .await
        .verification
        .expect("verification token is issued on registration");

    let (status, _) = send(
        &router,
        patch(
            "/api/v1/auth/verify-account",
            Some(&access),
            json!({"token": "definitely0wrong0token"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &router,
        patch(
            "/api/v1/auth/verify-account",
            Some(&access),
            json!({"token": issued.value.to_string()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["user"]["is_verified"], true);

    // A consumed token never succeeds twice.
    let (status, _) = send(
        &router,
        patch(
            "/api/v1/auth/verify-account",
            Some(&access),
            json!({"token": issued.value.to_string()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resets_password_with_one_time_token() {
    let (state, router) = app();
    register(&router, "alex@example.com", "old1password").await;

    // The response does not reveal whether the email is registered.
    let (status, body) = send(
        &router,
        post(
            "/api/v1/auth/forgot-password",
            None,
            json!({"email": "alex@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (unknown_status, unknown_body) = send(
        &router,
        post(
            "/api/v1/auth/forgot-password",
            None,
            json!({"email": "nobody@example.com"}),
        ),
    )
    .await;
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(body["message"], unknown_body["message"]);

    let account = stored_user(&state, "alex@example.com").await;
    let issued = account.password_reset.expect("reset token is issued");

    let (status, _) = send(
        &router,
        patch(
            "/api/v1/auth/reset-password",
            None,
            json!({
                "email": "alex@example.com",
                "token": issued.value.to_string(),
                "new_password": "new1password",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The token is consumed atomically with the password change.
    let refreshed = state
        .service
        .execute(query::user::ById::by(account.id))
        .await
        .unwrap()
        .expect("user is stored");
    assert!(refreshed.password_reset.is_none());

    // Old password no longer works, the new one does.
    let (status, _) = send(
        &router,
        post(
            "/api/v1/auth/login",
            None,
            json!({"email": "alex@example.com", "password": "old1password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    _ = login(&router, "alex@example.com", "new1password").await;
}

#[tokio::test]
async fn product_catalog_crud_with_cache_eviction() {
    let (state, router) = app();
    seed_admin(&state, "admin@example.com", "admin1password").await;
    let (admin, _) = login(&router, "admin@example.com", "admin1password").await;

    // Catalog mutations are admin-only.
    register(&router, "shopper@example.com", "hunter2hunter2").await;
    let (shopper, _) =
        login(&router, "shopper@example.com", "hunter2hunter2").await;
    let (status, _) = send(
        &router,
        post(
            "/api/v1/products/create",
            Some(&shopper),
            json!({
                "name": "Lamp",
                "description": "A desk lamp",
                "price": 19.99,
                "category": "Lighting",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &router,
        post(
            "/api/v1/products/create",
            Some(&admin),
            json!({
                "name": "Lamp",
                "description": "A desk lamp",
                "price": 19.99,
                "category": "Lighting",
                "stock": 3,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["data"]["product"]["id"].as_str().unwrap().to_owned();

    // The listing is cached, so two reads return the bit-identical body.
    let first = router
        .clone()
        .oneshot(get("/api/v1/products/all", None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = first.into_body().collect().await.unwrap().to_bytes();
    let second = router
        .clone()
        .oneshot(get("/api/v1/products/all", None))
        .await
        .unwrap();
    let second = second.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(first, second);
    let body: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(body["data"]["meta"]["total"], 1);

    // A mutation evicts the listing before running.
    let (status, _) = send(
        &router,
        post(
            "/api/v1/products/create",
            Some(&admin),
            json!({
                "name": "Chair",
                "description": "A wooden chair",
                "price": 49.0,
                "category": "Furniture",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&router, get("/api/v1/products/all", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["meta"]["total"], 2);

    // Single product and case-insensitive category lookups.
    let (status, body) =
        send(&router, get(&format!("/api/v1/products/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["product"]["name"], "Lamp");

    let (status, body) = send(
        &router,
        get("/api/v1/products/category/LIGHTING", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["meta"]["total"], 1);

    // Update and delete round out the lifecycle.
    let (status, body) = send(
        &router,
        patch(
            &format!("/api/v1/products/update/{id}"),
            Some(&admin),
            json!({"price": 24.99, "available": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["product"]["available"], false);

    let resp = router
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/api/v1/products/delete/{id}"),
            Some(&admin),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, _) =
        send(&router, get(&format!("/api/v1/products/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
