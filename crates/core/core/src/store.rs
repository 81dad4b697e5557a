//! The storage boundary.
//!
//! Adapters implement [`CollectionStore`] to persist schemaless records.
//! Services never talk to an adapter directly; they go through
//! [`crate::repository::Repository`] or [`crate::repository::RecordService`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::OwnerResult;
use crate::query::{ListQuery, ListResult};

/// A stored record: a JSON object.
pub type Record = Map<String, Value>;

/// Persistence for records grouped by collection.
///
/// Implementations own the system fields: `id` is generated when absent,
/// `created_at` is stamped on create, `updated_at` on every write. `id` and
/// `created_at` never change after creation.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Inserts a record and returns it as stored.
    async fn create(&self, collection: Collection, record: Record) -> OwnerResult<Record>;

    /// Fetches a record by id.
    async fn get(&self, collection: Collection, id: &str) -> OwnerResult<Option<Record>>;

    /// Lists records matching a query.
    async fn list(&self, collection: Collection, query: &ListQuery) -> OwnerResult<ListResult<Record>>;

    /// Merges `patch` into the stored record. Keys set to `null` are cleared.
    async fn update(&self, collection: Collection, id: &str, patch: Record) -> OwnerResult<Record>;

    /// Deletes a record. Deleting a missing record is a `NotFound` error.
    async fn delete(&self, collection: Collection, id: &str) -> OwnerResult<Record>;

    /// Counts records matching a filter string.
    async fn count(&self, collection: Collection, filter: Option<&str>) -> OwnerResult<usize> {
        let mut query = ListQuery::new().per_page(1);
        query.filter = filter.map(str::to_string);
        Ok(self.list(collection, &query).await?.total_items)
    }
}

/// Converts a JSON value into a record, rejecting non-objects.
pub fn into_record(value: Value) -> OwnerResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(crate::error::OwnerError::invalid_field(
            "record",
            format!("expected a JSON object, got {}", kind(&other)),
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
