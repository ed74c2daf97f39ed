//! HTTP surface of the entitlement engine.
//!
//! - `GET  /health` liveness probe
//! - `POST /api/checkout/order` order for an explicit USD amount (auth)
//! - `POST /api/checkout/verify` completed-payment verification
//! - `POST /api/premium/purchase` tier purchase for the caller (auth)
//! - `GET  /api/premium/entitlements` the caller's active entitlements (auth)
//!
//! Verification verdicts ride in the response body with HTTP 200; a 400
//! means the request itself was structurally bad. Error bodies are always
//! `{"error": "<reason>"}`.

mod auth;
mod checkout;
mod premium;

pub use auth::{AuthenticatedUser, Authenticator, BearerIdentity};

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::error::Error;
use crate::purchase::PurchaseOrchestrator;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<PurchaseOrchestrator>,
    auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Bundles the purchase engine with the authenticator guarding it.
    pub fn new(engine: Arc<PurchaseOrchestrator>, auth: Arc<dyn Authenticator>) -> Self {
        Self { engine, auth }
    }
}

/// Builds the service router over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/checkout/order", post(checkout::create_order))
        .route("/api/checkout/verify", post(checkout::verify_payment))
        .route("/api/premium/purchase", post(premium::purchase))
        .route("/api/premium/entitlements", get(premium::entitlements))
        .with_state(state)
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// Maps an engine error onto the wire.
///
/// Caller mistakes are 400s; rate-service and provider trouble surface
/// as 500s, matching what dashboard clients already handle.
fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::InvalidAmount(_) | Error::MalformedTransaction(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// A body that failed to parse is the caller's mistake, not a 422.
fn rejected(rejection: &JsonRejection) -> Response {
    bad_request(&rejection.body_text())
}

fn bad_request(reason: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": reason })),
    )
        .into_response()
}
