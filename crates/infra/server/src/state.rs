//! Shared application state.

use owner_adapter_memory::MemoryStore;
use owner_admin::{DnsResolver, DohResolver, OwnerAdmin, PaymentProvider, StripeProvider};
use owner_core::{EventBus, RecordService};
use owner_webhooks::{ReqwestTransport, WebhookDispatcher, WebhookTransport};
use std::sync::Arc;

use crate::config::{Config, ConfigError};

/// Actor that API mutations are attributed to.
pub const API_ACTOR: &str = "owner";

/// External systems the server talks to.
#[derive(Clone)]
pub struct Integrations {
    pub transport: Arc<dyn WebhookTransport>,
    pub payments: Arc<dyn PaymentProvider>,
    pub dns: Arc<dyn DnsResolver>,
}

impl Integrations {
    /// The real HTTP-backed integrations.
    pub fn from_config(config: &Config) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            payments: Arc::new(StripeProvider::new(config.billing.stripe_config())),
            dns: Arc::new(DohResolver::new(config.dns.doh_endpoint.clone())),
        }
    }
}

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub admin: OwnerAdmin,
    pub dispatcher: WebhookDispatcher,
    admin_token: Arc<str>,
}

impl AppState {
    /// Wires a memory store, the given event bus and integrations into the
    /// owner services, and subscribes the webhook dispatcher to every event.
    pub async fn build(config: &Config, bus: Arc<EventBus>, integrations: Integrations) -> Result<Self, ConfigError> {
        let admin_token = config
            .server
            .admin_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid("server.admin_token is required".to_string()))?;

        let records = RecordService::new(Arc::new(MemoryStore::new()), bus.clone());
        let dispatcher = WebhookDispatcher::new(records.clone(), integrations.transport)
            .with_config(config.webhooks.dispatcher_config());
        bus.on_all(dispatcher.clone()).await;

        let admin = OwnerAdmin::new(records, config.admin_config(), integrations.payments, integrations.dns)
            .as_actor(API_ACTOR);
        admin.install_hooks().await;

        Ok(Self {
            admin,
            dispatcher,
            admin_token: admin_token.into(),
        })
    }

    /// State for the binary: parallel event bus, real integrations.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::build(config, Arc::new(EventBus::new()), Integrations::from_config(config)).await
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Name recorded on audit entries and reports.
    pub fn actor(&self) -> &str {
        self.admin.records().actor()
    }
}
