//! Webhook delivery: fan-out, signing, history and retry execution.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

use owner_core::{
    Collection, DeliveryStatus, Event, EventError, EventHandler, EventType, ListQuery, ListResult,
    RecordService, Webhook, WebhookDelivery, all_of, quote,
};

use crate::error::{WebhookError, WebhookResult};
use crate::matching::webhook_matches;
use crate::retry::RetrySchedule;
use crate::signature::{SIGNATURE_HEADER, WebhookSigner};
use crate::transport::{OutboundRequest, WebhookTransport};

/// Actor recorded on the dispatcher's own writes. Events from this actor
/// are never delivered, so bookkeeping cannot trigger further deliveries.
pub const DISPATCHER_ACTOR: &str = "webhooks";

/// Response bodies are stored up to this many bytes.
pub const RESPONSE_BODY_LIMIT: usize = 2048;

/// Event type of test sends.
pub const TEST_EVENT: &str = "webhook.test";

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub user_agent: String,
    /// Used when a webhook has no timeout of its own.
    pub default_timeout: Duration,
    /// Exhausted deliveries in a row before a webhook is disabled.
    pub auto_disable_threshold: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Owner-Webhooks/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: Duration::from_secs(10),
            auto_disable_threshold: 10,
        }
    }
}

/// Builds the JSON body sent for an event.
pub fn build_payload(event: &Event) -> Value {
    json!({
        "id": event.id,
        "event": event.type_string(),
        "tenant_id": event.tenant_id,
        "created_at": event.timestamp,
        "data": event.record,
    })
}

/// Delivers events to matching webhooks and keeps delivery history.
#[derive(Clone)]
pub struct WebhookDispatcher {
    records: RecordService,
    transport: Arc<dyn WebhookTransport>,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    /// Creates a dispatcher with default settings.
    pub fn new(records: RecordService, transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            records: records.with_actor(DISPATCHER_ACTOR),
            transport,
            config: DispatcherConfig::default(),
        }
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Sends `event` to every matching active webhook.
    ///
    /// A failure to reach one webhook never stops the others.
    pub async fn dispatch(&self, event: &Event) -> WebhookResult<Vec<WebhookDelivery>> {
        if event.actor.as_deref() == Some(DISPATCHER_ACTOR) || is_bookkeeping(event) {
            return Ok(Vec::new());
        }

        let webhooks = self.subscribers().await?;
        let payload = build_payload(event);

        let mut deliveries = Vec::new();
        for webhook in webhooks.iter().filter(|w| webhook_matches(w, event)) {
            match self.deliver(webhook, event, payload.clone()).await {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => tracing::error!(
                    webhook = %webhook.id,
                    event = %event.event_type,
                    "failed to record webhook delivery: {}",
                    e
                ),
            }
        }
        Ok(deliveries)
    }

    /// Every stored webhook that decodes. A malformed record is logged and
    /// left out so it cannot stop delivery to the rest.
    async fn subscribers(&self) -> WebhookResult<Vec<Webhook>> {
        let records = self.records.full_list(Collection::Webhooks, None, None).await?;
        let mut webhooks = Vec::with_capacity(records.len());
        for record in records {
            let id = record.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            match serde_json::from_value::<Webhook>(Value::Object(record)) {
                Ok(webhook) => webhooks.push(webhook),
                Err(e) => tracing::warn!(webhook = %id, "skipping malformed webhook: {}", e),
            }
        }
        Ok(webhooks)
    }

    /// Re-sends every `retrying` delivery whose time has come.
    ///
    /// Deliveries of deleted or disabled webhooks are marked failed.
    pub async fn process_due(&self) -> WebhookResult<usize> {
        let now = Utc::now().to_rfc3339();
        let filter = format!("status = 'retrying' && next_retry_at <= {}", quote(&now));
        let due = self.records.repo::<WebhookDelivery>().full_list(Some(&filter)).await?;

        let mut processed = 0;
        for mut delivery in due {
            match self.records.repo::<Webhook>().get(&delivery.webhook_id).await? {
                Some(webhook) if webhook.active => match self.attempt(&webhook, delivery).await {
                    Ok(_) => processed += 1,
                    Err(e) => tracing::error!("webhook retry failed to run: {}", e),
                },
                _ => {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.next_retry_at = None;
                    delivery.error = Some("webhook was removed or disabled".to_string());
                    self.records.repo::<WebhookDelivery>().update(&delivery).await?;
                }
            }
        }

        if processed > 0 {
            tracing::info!(processed, "retried due webhook deliveries");
        }
        Ok(processed)
    }

    /// Re-sends a failed or retrying delivery now, as its next attempt.
    pub async fn retry(&self, delivery_id: &str) -> WebhookResult<WebhookDelivery> {
        let delivery = self.records.repo::<WebhookDelivery>().require(delivery_id).await?;
        if !matches!(delivery.status, DeliveryStatus::Failed | DeliveryStatus::Retrying) {
            return Err(WebhookError::InvalidState(format!(
                "delivery {} is {} and cannot be retried",
                delivery.id, delivery.status
            )));
        }

        let webhook = self.records.repo::<Webhook>().require(&delivery.webhook_id).await?;
        self.attempt(&webhook, delivery).await
    }

    /// Sends a synthetic `webhook.test` event to one webhook.
    pub async fn send_test(&self, webhook_id: &str) -> WebhookResult<WebhookDelivery> {
        let webhook = self.records.repo::<Webhook>().require(webhook_id).await?;

        let (resource, action) = TEST_EVENT.split_once('.').unwrap_or((TEST_EVENT, ""));
        let mut event = Event::new(
            EventType::new(resource, action),
            json!({
                "webhook_id": webhook.id,
                "message": "This is a test delivery from Owner Console",
            }),
        );
        if let Some(tenant_id) = &webhook.tenant_id {
            event = event.with_tenant(tenant_id.clone());
        }

        let payload = build_payload(&event);
        self.deliver(&webhook, &event, payload).await
    }

    /// Delivery history of a webhook, newest first unless sorted otherwise.
    pub async fn history(&self, webhook_id: &str, query: &ListQuery) -> WebhookResult<ListResult<WebhookDelivery>> {
        let mut query = query.clone();
        let scope = format!("webhook_id = {}", quote(webhook_id));
        query.filter = Some(all_of([scope, query.filter.unwrap_or_default()]));
        if query.sort.is_none() {
            query.sort = Some("-created_at".to_string());
        }
        Ok(self.records.repo::<WebhookDelivery>().list(&query).await?)
    }

    async fn deliver(&self, webhook: &Webhook, event: &Event, payload: Value) -> WebhookResult<WebhookDelivery> {
        let delivery = WebhookDelivery {
            webhook_id: webhook.id.clone(),
            tenant_id: event.tenant_id.clone(),
            event: event.type_string(),
            event_id: event.id.clone(),
            payload,
            status: DeliveryStatus::Pending,
            ..Default::default()
        };
        let delivery = self.records.repo::<WebhookDelivery>().create(&delivery).await?;
        self.attempt(webhook, delivery).await
    }

    fn build_request(&self, webhook: &Webhook, delivery: &WebhookDelivery, body: String) -> OutboundRequest {
        let signature = WebhookSigner::new(&webhook.secret).sign(body.as_bytes());
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("X-Webhook-Event".to_string(), delivery.event.clone()),
            ("X-Webhook-Delivery".to_string(), delivery.id.clone()),
            (SIGNATURE_HEADER.to_string(), signature),
        ];
        for (key, value) in &webhook.headers {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                headers.push((key.clone(), value.clone()));
            }
        }

        let timeout = match webhook.timeout_ms {
            0 => self.config.default_timeout,
            ms => Duration::from_millis(ms),
        };

        OutboundRequest {
            url: webhook.url.clone(),
            headers,
            body,
            timeout,
        }
    }

    async fn attempt(&self, webhook: &Webhook, mut delivery: WebhookDelivery) -> WebhookResult<WebhookDelivery> {
        let body = serde_json::to_string(&delivery.payload)?;
        let request = self.build_request(webhook, &delivery, body);

        let started = Instant::now();
        let outcome = self.transport.send(request).await;
        delivery.duration_ms = started.elapsed().as_millis() as u64;
        delivery.attempt += 1;

        let succeeded = match outcome {
            Ok(response) => {
                delivery.response_status = Some(response.status);
                delivery.response_body = Some(truncate(&response.body, RESPONSE_BODY_LIMIT));
                delivery.error = (!response.is_success()).then(|| format!("HTTP {}", response.status));
                response.is_success()
            }
            Err(e) => {
                delivery.response_status = None;
                delivery.response_body = None;
                delivery.error = Some(e.to_string());
                false
            }
        };

        if succeeded {
            delivery.status = DeliveryStatus::Success;
            delivery.next_retry_at = None;
        } else {
            let next = RetrySchedule::from_policy(&webhook.retry_policy)
                .next_delay(delivery.attempt)
                .and_then(|delay| chrono::Duration::from_std(delay).ok())
                .and_then(|delay| Utc::now().checked_add_signed(delay));
            delivery.status = match next {
                Some(_) => DeliveryStatus::Retrying,
                None => DeliveryStatus::Failed,
            };
            delivery.next_retry_at = next;
            tracing::warn!(
                webhook = %webhook.id,
                delivery = %delivery.id,
                attempt = delivery.attempt,
                status = %delivery.status,
                "webhook delivery failed: {}",
                delivery.error.as_deref().unwrap_or("unknown error")
            );
        }

        let delivery = self.records.repo::<WebhookDelivery>().update(&delivery).await?;
        self.record_outcome(&webhook.id, &delivery).await?;
        Ok(delivery)
    }

    /// Updates the webhook's failure streak and disables it at the threshold.
    async fn record_outcome(&self, webhook_id: &str, delivery: &WebhookDelivery) -> WebhookResult<()> {
        let webhooks = self.records.repo::<Webhook>();
        let Some(current) = webhooks.get(webhook_id).await? else {
            return Ok(());
        };

        let mut patch = json!({ "last_triggered_at": Utc::now() });
        match delivery.status {
            DeliveryStatus::Success => {
                patch["consecutive_failures"] = json!(0);
            }
            DeliveryStatus::Failed => {
                let failures = current.consecutive_failures + 1;
                patch["consecutive_failures"] = json!(failures);
                if current.active && failures >= self.config.auto_disable_threshold {
                    patch["active"] = json!(false);
                    tracing::warn!(
                        webhook = %current.id,
                        url = %current.url,
                        failures,
                        "webhook disabled after repeated delivery failures"
                    );
                }
            }
            DeliveryStatus::Pending | DeliveryStatus::Retrying => {}
        }

        webhooks.patch(webhook_id, patch).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for WebhookDispatcher {
    fn id(&self) -> &str {
        "webhook_dispatcher"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        self.dispatch(event)
            .await
            .map(|_| ())
            .map_err(|e| EventError::Hook(e.to_string()))
    }
}

/// Delivery history and the audit trail are never delivered themselves.
fn is_bookkeeping(event: &Event) -> bool {
    matches!(
        event.collection.as_deref(),
        Some(c) if c == Collection::WebhookDeliveries.as_str() || c == Collection::AuditLogs.as_str()
    )
}

fn truncate(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
