//! # Owner Console Core
//!
//! Foundational types for the Owner control plane: the record collections
//! and their schemas, the filter language, list queries, the storage trait,
//! typed repositories that publish lifecycle events, and the small
//! utilities every service shares (validation, sanitizing, retry).

pub mod collection;
pub mod error;
pub mod filter;
pub mod query;
pub mod repository;
pub mod retry;
pub mod sanitize;
pub mod schema;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used items at the crate root
pub use collection::Collection;
pub use error::{OwnerError, OwnerResult};
pub use filter::{Filter, Op, all_of, quote};
pub use query::{DEFAULT_PER_PAGE, ListQuery, ListResult, MAX_PER_PAGE, SortKey};
pub use repository::{Model, RecordService, Repository, SYSTEM_ACTOR};
pub use retry::{RetryConfig, retry_async};
pub use sanitize::{sanitize_record, strip_html};
pub use schema::{CollectionSchema, Field, FieldType, all_schemas, schema_for};
pub use store::{CollectionStore, Record, into_record};
pub use types::*;
pub use validation::{Rule, ValidationErrors, Validator};

// Re-export event types from the events crate
pub use owner_events as events;
pub use owner_events::{Event, EventBus, EventError, EventHandler, EventType};
