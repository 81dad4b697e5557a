//! Admin token check for the API.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use owner_core::OwnerError;
use owner_webhooks::constant_time_compare;

use crate::error::ApiError;
use crate::state::AppState;

/// Rejects requests without `Authorization: Bearer <admin_token>`.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "missing bearer token");
        return Err(ApiError(OwnerError::Unauthorized));
    };
    if !constant_time_compare(token, state.admin_token()) {
        tracing::warn!(path = %request.uri().path(), "invalid admin token");
        return Err(ApiError(OwnerError::Unauthorized));
    }
    Ok(next.run(request).await)
}

/// Extracts the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
