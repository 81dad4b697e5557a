//! Errors from the delivery pipeline and their mapping onto [`OwnerError`].

use owner_core::OwnerError;
use thiserror::Error;

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Failures while signing, sending or retrying a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The `X-Webhook-Signature` header did not match the body.
    #[error("signature mismatch")]
    InvalidSignature,

    #[error("payload could not be encoded: {0}")]
    InvalidPayload(String),

    /// The receiver could not be reached; no status code was seen.
    #[error("transport failure: {0}")]
    HttpError(String),

    #[error("receiver did not answer within the webhook timeout")]
    Timeout,

    /// Retrying a delivery that already succeeded, for example.
    #[error("delivery cannot be retried: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] OwnerError),
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for WebhookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebhookError::Timeout
        } else {
            WebhookError::HttpError(err.to_string())
        }
    }
}

impl From<WebhookError> for OwnerError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Store(e) => e,
            WebhookError::InvalidSignature => OwnerError::Unauthorized,
            WebhookError::InvalidPayload(message) => OwnerError::SerializationError { message },
            WebhookError::HttpError(message) => OwnerError::network(message),
            WebhookError::Timeout => OwnerError::Timeout,
            WebhookError::InvalidState(message) => OwnerError::conflict(message),
        }
    }
}
