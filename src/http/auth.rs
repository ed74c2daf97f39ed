//! Bearer-token authentication seam.
//!
//! Token issuance lives outside this service. The engine only needs a
//! user key for each request, so the seam is a single trait and the
//! default implementation treats the externally issued bearer token as
//! that key.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use super::AppState;
use crate::entitlements::UserId;

/// Resolves a bearer token to the user it identifies.
pub trait Authenticator: Send + Sync {
    /// Returns the user the token belongs to, or `None` to reject it.
    fn authenticate(&self, token: &str) -> Option<UserId>;
}

/// Accepts any non-empty bearer token as an opaque user key.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerIdentity;

impl Authenticator for BearerIdentity {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(UserId::from(token))
        }
    }
}

/// Extractor for routes that require a caller identity.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.auth.authenticate(token));

        user.map(AuthenticatedUser).ok_or_else(unauthorized)
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "authentication required" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_identity_accepts_any_non_empty_token() {
        let auth = BearerIdentity;

        assert_eq!(
            auth.authenticate("breeze@example.com"),
            Some(UserId::from("breeze@example.com"))
        );
    }

    #[test]
    fn bearer_identity_rejects_blank_tokens() {
        let auth = BearerIdentity;

        assert_eq!(auth.authenticate(""), None);
        assert_eq!(auth.authenticate("   "), None);
    }

    #[test]
    fn bearer_identity_trims_surrounding_whitespace() {
        let auth = BearerIdentity;

        assert_eq!(
            auth.authenticate("  gale@example.com "),
            Some(UserId::from("gale@example.com"))
        );
    }
}
