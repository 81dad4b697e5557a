//! In-process integrations for handler tests.

use async_trait::async_trait;
use owner_admin::{CheckoutRequest, CheckoutSession, DnsResolver, PaymentProvider};
use owner_core::{EventBus, OwnerResult};
use owner_webhooks::{OutboundRequest, TransportResponse, WebhookResult, WebhookTransport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::state::{AppState, Integrations};

pub const TEST_TOKEN: &str = "test-admin-token";

/// Replies with scripted statuses, then 200s, and keeps every request.
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<VecDeque<u16>>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl RecordingTransport {
    pub fn reply_status(&self, status: u16) {
        self.replies.lock().unwrap().push_back(status);
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> WebhookResult<TransportResponse> {
        self.sent.lock().unwrap().push(request);
        let status = self.replies.lock().unwrap().pop_front().unwrap_or(200);
        Ok(TransportResponse {
            status,
            body: String::new(),
        })
    }
}

pub struct StaticCheckout;

#[async_trait]
impl PaymentProvider for StaticCheckout {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> OwnerResult<CheckoutSession> {
        Ok(CheckoutSession {
            session_id: format!("cs_test_{}", request.tenant_id),
            url: "https://checkout.test/session".to_string(),
        })
    }
}

pub struct NoDns;

#[async_trait]
impl DnsResolver for NoDns {
    async fn txt_records(&self, _name: &str) -> OwnerResult<Vec<String>> {
        Ok(Vec::new())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.admin_token = Some(TEST_TOKEN.to_string());
    config
}

/// State over a sequential bus, so hooks and deliveries finish before
/// the handler returns.
pub async fn test_state_with(transport: Arc<RecordingTransport>) -> AppState {
    let integrations = Integrations {
        transport,
        payments: Arc::new(StaticCheckout),
        dns: Arc::new(NoDns),
    };
    AppState::build(&test_config(), Arc::new(EventBus::sequential()), integrations)
        .await
        .unwrap()
}

pub async fn test_state() -> AppState {
    test_state_with(Arc::new(RecordingTransport::default())).await
}
