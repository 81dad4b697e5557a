//! Outbound HTTP for webhook deliveries.

use async_trait::async_trait;
use std::time::Duration;

use crate::delivery::RESPONSE_BODY_LIMIT;
use crate::error::WebhookResult;

/// A signed webhook request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// The exact bytes that were signed.
    pub body: String,
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends webhook requests. An `Err` means no response was received.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> WebhookResult<TransportResponse>;
}

/// Transport backed by a shared `reqwest` client.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http-client")]
impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> WebhookResult<TransportResponse> {
        let mut builder = self.client.post(&request.url).timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let mut response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();

        // Only the stored prefix is read; the rest of the body is dropped.
        let mut bytes = Vec::new();
        while bytes.len() < RESPONSE_BODY_LIMIT {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(url = %request.url, "response body cut short: {}", e);
                    break;
                }
            }
        }
        Ok(TransportResponse {
            status,
            body: body_prefix(&bytes, RESPONSE_BODY_LIMIT),
        })
    }
}

/// Decodes at most `limit` bytes of a response body as text. A character
/// split by the cut is dropped.
pub(crate) fn body_prefix(bytes: &[u8], limit: usize) -> String {
    let cut = &bytes[..bytes.len().min(limit)];
    match std::str::from_utf8(cut) {
        Ok(text) => text.to_string(),
        Err(e) if e.error_len().is_none() => String::from_utf8_lossy(&cut[..e.valid_up_to()]).into_owned(),
        Err(_) => String::from_utf8_lossy(cut).into_owned(),
    }
}
