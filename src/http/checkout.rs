//! Order creation and payment verification routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{error_response, rejected, AppState, AuthenticatedUser};
use crate::checkout::{Order, Transaction};
use crate::entitlements::{Term, Tier};
use crate::purchase::VerifyOutcome;

#[derive(Debug, Deserialize)]
pub(super) struct OrderRequest {
    amount_usd: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderResponse {
    order: Order,
    amount_local: u64,
    rate: f64,
    checkout_key: String,
}

/// `POST /api/checkout/order`
pub(super) async fn create_order(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => return rejected(&rejection),
    };

    match state.engine.quote_order(request.amount_usd).await {
        Ok(quote) => Json(OrderResponse {
            order: quote.order,
            amount_local: quote.amount_local,
            rate: quote.rate,
            checkout_key: state.engine.checkout_key().to_string(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Entitlement summary attached to a successful grant.
#[derive(Debug, Serialize)]
pub(super) struct GrantedSummary {
    tier: Tier,
    term: Term,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct VerifyResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    granted: Option<GrantedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// `POST /api/checkout/verify`
///
/// Unauthenticated, like the provider's own completion callbacks. The
/// verdict is carried in the body; only a structurally broken report
/// is an HTTP error.
pub(super) async fn verify_payment(
    State(state): State<AppState>,
    payload: Result<Json<Transaction>, JsonRejection>,
) -> Response {
    let Json(txn) = match payload {
        Ok(json) => json,
        Err(rejection) => return rejected(&rejection),
    };

    match state.engine.complete(&txn) {
        Ok(outcome) => Json(verdict(outcome)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn verdict(outcome: VerifyOutcome) -> VerifyResponse {
    match outcome {
        VerifyOutcome::Granted {
            attempt,
            entitlement,
        } => VerifyResponse {
            success: true,
            granted: Some(GrantedSummary {
                tier: attempt.tier,
                term: attempt.term,
                expires_at: entitlement.expires_at,
            }),
            reason: None,
        },
        VerifyOutcome::Verified => VerifyResponse {
            success: true,
            granted: None,
            reason: None,
        },
        VerifyOutcome::Rejected { reason } => VerifyResponse {
            success: false,
            granted: None,
            reason: Some(reason),
        },
    }
}
