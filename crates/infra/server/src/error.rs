//! HTTP error responses and request extractors that produce them.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use owner_core::OwnerError;
use owner_webhooks::WebhookError;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::ConfigError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Any failure a handler can return, rendered as
/// `{"message", "code", "status"}`.
#[derive(Debug)]
pub struct ApiError(pub OwnerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "request rejected");
        }

        let mut body = json!({
            "message": self.0.to_string(),
            "code": self.0.code(),
            "status": status.as_u16(),
        });
        if let OwnerError::Validation { errors } = &self.0 {
            body["errors"] = json!(errors);
        }
        (status, Json(body)).into_response()
    }
}

impl From<OwnerError> for ApiError {
    fn from(err: OwnerError) -> Self {
        ApiError(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(OwnerError::invalid_field("body", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(OwnerError::invalid_field("query", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(OwnerError::invalid_field("path", rejection.body_text()))
    }
}

/// `Json` whose rejection is an [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejection is an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Path` whose rejection is an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Parses a JSON body that may be omitted entirely.
pub fn optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError(OwnerError::invalid_field("body", e.to_string())))
}

/// Startup failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::collections::BTreeMap;

    async fn render(err: OwnerError) -> (StatusCode, Value) {
        let response = ApiError(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_shape() {
        let (status, body) = render(OwnerError::not_found("tenant", "id", "t1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["status"], 404);
        assert!(body["message"].as_str().unwrap().contains("t1"));
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        let mut errors = BTreeMap::new();
        errors.insert("slug".to_string(), vec!["must be a slug".to_string()]);
        let (status, body) = render(OwnerError::Validation { errors }).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["slug"][0], "must be a slug");
    }

    #[tokio::test]
    async fn test_upstream_maps_to_bad_gateway() {
        let (status, body) = render(OwnerError::upstream("stripe", 503, "unavailable")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "upstream_error");
    }

    #[test]
    fn test_optional_body() {
        #[derive(Debug, Default, serde::Deserialize)]
        struct Reason {
            reason: Option<String>,
        }

        assert!(optional_body::<Reason>(b"").unwrap().reason.is_none());
        assert!(optional_body::<Reason>(b" \n").unwrap().reason.is_none());
        let parsed: Reason = optional_body(br#"{"reason":"fraud"}"#).unwrap();
        assert_eq!(parsed.reason.as_deref(), Some("fraud"));
        let err = optional_body::<Reason>(b"{").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
