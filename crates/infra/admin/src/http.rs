//! Shared handling of outbound HTTP responses.

use owner_core::{OwnerError, OwnerResult};
use serde_json::Value;

/// Maps a transport failure to a retryable error.
pub(crate) fn request_error(err: reqwest::Error) -> OwnerError {
    if err.is_timeout() {
        OwnerError::Timeout
    } else {
        OwnerError::network(err.to_string())
    }
}

/// Passes 2xx responses through and turns everything else into an error.
pub(crate) async fn check_status(service: &str, response: reqwest::Response) -> OwnerResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        return Err(OwnerError::RateLimitExceeded { retry_after_seconds });
    }

    let body = response.text().await.unwrap_or_default();
    Err(OwnerError::upstream(service, status.as_u16(), error_message(&body)))
}

/// Pulls `error.message` out of a JSON error body, else the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect())
}
