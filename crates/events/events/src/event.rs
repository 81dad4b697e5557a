//! Event types and structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Standard record lifecycle actions.
pub mod record_actions {
    /// A record was created.
    pub const CREATED: &str = "created";
    /// A record was updated.
    pub const UPDATED: &str = "updated";
    /// A record was deleted.
    pub const DELETED: &str = "deleted";
}

/// A lifecycle event fired after a record mutation (or a custom action).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event instance.
    pub id: String,
    /// The event type (resource + action).
    pub event_type: EventType,
    /// Collection the record lives in, when the event concerns a record.
    pub collection: Option<String>,
    /// The record (or custom payload) as it was after the mutation.
    pub record: Value,
    /// Who caused the event.
    pub actor: Option<String>,
    /// Tenant the record belongs to, if any.
    pub tenant_id: Option<String>,
    /// Timestamp when the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event with the given type and payload.
    ///
    /// `tenant_id` is lifted from the payload when it carries one.
    pub fn new(event_type: EventType, record: impl Serialize) -> Self {
        let record = serde_json::to_value(record).unwrap_or(Value::Null);
        let tenant_id = record
            .get("tenant_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            collection: None,
            record,
            actor: None,
            tenant_id,
            timestamp: Utc::now(),
        }
    }

    /// Creates a record lifecycle event for a collection.
    ///
    /// The resource name is the singular form of the collection
    /// (`support_tickets` -> `support_ticket`).
    pub fn for_record(collection: &str, action: &str, record: impl Serialize) -> Self {
        let mut event = Self::new(EventType::new(singular(collection), action), record);
        event.collection = Some(collection.to_string());
        event
    }

    /// Sets the acting principal.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Overrides the tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Returns the type string (e.g., "tenant.created").
    pub fn type_string(&self) -> String {
        self.event_type.to_string()
    }

    /// The record id, when the payload has one.
    pub fn record_id(&self) -> Option<&str> {
        self.record.get("id").and_then(Value::as_str)
    }

    /// Deserializes the payload to a specific type.
    pub fn record_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        serde_json::from_value(self.record.clone()).ok()
    }
}

/// Event type identifier: the resource and what happened to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventType {
    /// Resource (e.g., "tenant", "invoice", "webhook").
    pub resource: String,
    /// Action (e.g., "created", "updated", "cloned").
    pub action: String,
}

impl EventType {
    /// Creates a new event type.
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parses "resource.action"; a string without a dot becomes a bare resource.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((resource, action)) => Self::new(resource, action),
            None => Self::new(s, ""),
        }
    }

    /// Checks whether this type matches a subscription pattern.
    ///
    /// Patterns: `*`, `resource.*`, or an exact `resource.action`.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            return self.resource == prefix;
        }
        pattern == self.to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.action)
        }
    }
}

fn singular(collection: &str) -> String {
    collection
        .strip_suffix("ies")
        .map(|stem| format!("{stem}y"))
        .or_else(|| collection.strip_suffix('s').map(str::to_string))
        .unwrap_or_else(|| collection.to_string())
}
