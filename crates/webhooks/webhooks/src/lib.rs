//! # Owner Console Webhooks
//!
//! Outbound webhooks for Owner Console:
//! - Subscription matching by event pattern and tenant scope
//! - HMAC-SHA256 body signatures
//! - Delivery history with per-webhook retry policies
//! - Automatic disabling of endpoints that keep failing
//!
//! ## Example
//!
//! ```rust,ignore
//! use owner_webhooks::{ReqwestTransport, WebhookDispatcher};
//!
//! let dispatcher = WebhookDispatcher::new(records, Arc::new(ReqwestTransport::new()));
//!
//! // Deliver every record event
//! event_bus.on_all(dispatcher.clone()).await;
//!
//! // Periodically run due retries
//! dispatcher.process_due().await?;
//! ```

mod delivery;
mod error;
mod matching;
mod retry;
mod signature;
mod transport;

pub use delivery::{
    DISPATCHER_ACTOR, DispatcherConfig, RESPONSE_BODY_LIMIT, TEST_EVENT, WebhookDispatcher, build_payload,
};
pub use error::{WebhookError, WebhookResult};
pub use matching::{pattern_matches, webhook_matches};
pub use retry::RetrySchedule;
pub use signature::{SIGNATURE_HEADER, WebhookSigner, constant_time_compare, generate_secret, verify_signature};
#[cfg(feature = "http-client")]
pub use transport::ReqwestTransport;
pub use transport::{OutboundRequest, TransportResponse, WebhookTransport};
