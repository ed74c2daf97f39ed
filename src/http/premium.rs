//! Tier purchase and entitlement listing routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{error_response, rejected, AppState, AuthenticatedUser};
use crate::entitlements::{Term, Tier};

#[derive(Debug, Deserialize)]
pub(super) struct PurchaseRequest {
    tier: Tier,
    term: Term,
}

/// `POST /api/premium/purchase`
///
/// Prices the purchase server-side, upgrade credit included, and hands
/// back everything the checkout widget needs.
pub(super) async fn purchase(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => return rejected(&rejection),
    };

    match state.engine.begin(&user, request.tier, request.term).await {
        Ok(ticket) => Json(ticket).into_response(),
        Err(err) => error_response(&err),
    }
}

/// One row of the caller's entitlement listing.
#[derive(Debug, Serialize)]
pub(super) struct EntitlementRow {
    tier: Tier,
    name: &'static str,
    term: Term,
    expires_at: DateTime<Utc>,
    features: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub(super) struct EntitlementsResponse {
    entitlements: Vec<EntitlementRow>,
}

/// `GET /api/premium/entitlements`
///
/// The server-authoritative answer to "what does this user hold right
/// now"; expired entries never appear.
pub(super) async fn entitlements(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Response {
    let rows = state
        .engine
        .active_entitlements(&user)
        .into_iter()
        .map(|entitlement| {
            let plan = state.engine.catalog().plan(entitlement.tier);
            EntitlementRow {
                tier: entitlement.tier,
                name: plan.name,
                term: entitlement.term,
                expires_at: entitlement.expires_at,
                features: plan.features,
            }
        })
        .collect();

    Json(EntitlementsResponse {
        entitlements: rows,
    })
    .into_response()
}
