//! # Owner Console Events
//!
//! Record lifecycle events for the Owner control plane:
//! - Typed event names (`support_ticket.created`, `invoice.updated`, ...)
//! - An in-process pub/sub bus with async handlers
//! - Bounded history for inspection and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use owner_events::{Event, EventBus, EventType};
//!
//! let bus = EventBus::new();
//! bus.on("support_ticket.*", handler).await;
//!
//! let event = Event::new(EventType::new("support_ticket", "created"), record)
//!     .with_actor("owner");
//! bus.emit(event).await;
//! ```

mod bus;
mod error;
mod event;
mod handler;

pub use bus::{Dispatch, EventBus};
pub use error::{EventError, EventResult};
pub use event::{Event, EventType, record_actions};
pub use handler::{BoxedHandler, EventHandler, HookOutcome};
