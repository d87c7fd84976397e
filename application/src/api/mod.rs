//! REST API definitions.

pub mod auth;
pub mod product;

use axum::{extract::State, routing::get, Json, Router};
use common::DateTime;
use serde_json::json;

use crate::{AppState, Envelope};

/// Builds the [`Router`] serving the whole API.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .nest("/api/v1/auth", auth::router(&state))
        .nest("/api/v1/products", product::router(&state))
        .with_state(state)
}

/// `GET /` health endpoint.
async fn health(
    State(state): State<AppState>,
) -> Json<Envelope<serde_json::Value>> {
    Json(Envelope::success(
        "API is running",
        json!({
            "environment": state.environment.to_string(),
            "timestamp": DateTime::now().to_rfc3339(),
        }),
    ))
}
