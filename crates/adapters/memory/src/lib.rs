//! # Owner Console Memory Adapter
//!
//! An in-memory [`CollectionStore`], used by the server by default and by
//! every test in the workspace.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use owner_adapter_memory::MemoryStore;
//! use owner_core::{EventBus, RecordService};
//!
//! let store = Arc::new(MemoryStore::new());
//! let records = RecordService::new(store, Arc::new(EventBus::new()));
//! ```

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use owner_core::schema::{CollectionSchema, schema_for};
use owner_core::{Collection, CollectionStore, ListQuery, ListResult, OwnerError, OwnerResult, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Records of one collection, in insertion order.
type Table = Vec<Record>;

/// In-memory record store.
///
/// Every write is checked against the collection schema and its unique
/// constraints. Data is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<Collection, Table>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all stored data.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }

    /// Returns the number of records in a collection.
    pub async fn len(&self, collection: Collection) -> usize {
        self.tables.read().await.get(&collection).map_or(0, Vec::len)
    }

    /// Returns true when no collection holds records.
    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.values().all(Vec::is_empty)
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn id_of(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn position(table: &Table, id: &str) -> Option<usize> {
    table.iter().position(|r| id_of(r) == Some(id))
}

/// Rejects `candidate` when it collides with any other record on a unique
/// constraint. `skip` is the candidate's own slot on update.
fn check_unique(
    schema: &CollectionSchema,
    table: &Table,
    candidate: &Record,
    skip: Option<usize>,
) -> OwnerResult<()> {
    for (fields, values) in schema.unique_keys(candidate) {
        let taken = table.iter().enumerate().any(|(i, existing)| {
            Some(i) != skip
                && schema
                    .unique_keys(existing)
                    .iter()
                    .any(|(f, v)| *f == fields && *v == values)
        });
        if taken {
            let value = values
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(",");
            return Err(OwnerError::duplicate(schema.collection.as_str(), fields, value));
        }
    }
    Ok(())
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn create(&self, collection: Collection, mut record: Record) -> OwnerResult<Record> {
        let id = match record.get("id") {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(_) => return Err(OwnerError::invalid_field("id", "expected a non-empty string")),
        };
        record.insert("id".to_string(), Value::String(id.clone()));

        let stamp = now();
        if record.get("created_at").is_none_or(Value::is_null) {
            record.insert("created_at".to_string(), stamp.clone());
        }
        record.insert("updated_at".to_string(), stamp);

        let schema = schema_for(collection);
        schema.check(&record)?;

        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        if position(table, &id).is_some() {
            return Err(OwnerError::duplicate(collection.as_str(), "id", id));
        }
        check_unique(&schema, table, &record, None)?;

        table.push(record.clone());
        Ok(record)
    }

    async fn get(&self, collection: Collection, id: &str) -> OwnerResult<Option<Record>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .and_then(|table| table.iter().find(|r| id_of(r) == Some(id)))
            .cloned())
    }

    async fn list(&self, collection: Collection, query: &ListQuery) -> OwnerResult<ListResult<Record>> {
        let records: Vec<Value> = {
            let tables = self.tables.read().await;
            tables
                .get(&collection)
                .map(|table| table.iter().cloned().map(Value::Object).collect())
                .unwrap_or_default()
        };

        query.apply(records)?.try_map(|value| match value {
            Value::Object(record) => Ok(record),
            _ => Err(OwnerError::internal("stored record is not an object")),
        })
    }

    async fn update(&self, collection: Collection, id: &str, patch: Record) -> OwnerResult<Record> {
        let schema = schema_for(collection);
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let index = position(table, id).ok_or_else(|| OwnerError::not_found(collection.as_str(), "id", id))?;

        let mut merged = table[index].clone();
        for (key, value) in patch {
            match key.as_str() {
                "id" | "created_at" | "updated_at" => continue,
                _ if value.is_null() => {
                    merged.remove(&key);
                }
                _ => {
                    merged.insert(key, value);
                }
            }
        }
        merged.insert("updated_at".to_string(), now());

        schema.check(&merged)?;
        check_unique(&schema, table, &merged, Some(index))?;

        table[index] = merged.clone();
        Ok(merged)
    }

    async fn delete(&self, collection: Collection, id: &str) -> OwnerResult<Record> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let index = position(table, id).ok_or_else(|| OwnerError::not_found(collection.as_str(), "id", id))?;
        Ok(table.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owner_core::into_record;
    use serde_json::json;

    fn tenant(slug: &str) -> Record {
        into_record(json!({
            "name": "Maple High",
            "slug": slug,
            "plan": "basic",
            "status": "trial",
            "owner_email": "admin@maple.edu"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_system_fields() {
        let store = MemoryStore::new();
        let created = store.create(Collection::Tenants, tenant("maple")).await.unwrap();

        let id = created["id"].as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert!(created["created_at"].is_string());
        assert_eq!(created["created_at"], created["updated_at"]);

        let fetched = store.get(Collection::Tenants, id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.len(Collection::Tenants).await, 1);
    }

    #[tokio::test]
    async fn test_explicit_id_and_created_at_are_kept() {
        let store = MemoryStore::new();
        let mut record = tenant("maple");
        record.insert("id".into(), json!("ten_1"));
        record.insert("created_at".into(), json!("2025-01-01T00:00:00Z"));

        let created = store.create(Collection::Tenants, record.clone()).await.unwrap();
        assert_eq!(created["id"], "ten_1");
        assert_eq!(created["created_at"], "2025-01-01T00:00:00Z");

        record.insert("slug".into(), json!("other"));
        let err = store.create(Collection::Tenants, record).await.unwrap_err();
        assert!(matches!(err, OwnerError::DuplicateEntry { ref field, .. } if field == "id"));
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryStore::new();
        store.create(Collection::Tenants, tenant("maple")).await.unwrap();

        let err = store.create(Collection::Tenants, tenant("maple")).await.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate entry: tenants with slug=maple already exists");

        // Null domains never collide.
        store.create(Collection::Tenants, tenant("birch")).await.unwrap();
        assert_eq!(store.len(Collection::Tenants).await, 2);
    }

    #[tokio::test]
    async fn test_composite_unique_constraint() {
        let store = MemoryStore::new();
        let user = |tenant: &str| {
            into_record(json!({"tenant_id": tenant, "email": "a@maple.edu", "role": "teacher"})).unwrap()
        };
        store.create(Collection::Users, user("t1")).await.unwrap();
        store.create(Collection::Users, user("t2")).await.unwrap();

        let err = store.create(Collection::Users, user("t1")).await.unwrap_err();
        assert!(matches!(err, OwnerError::DuplicateEntry { ref field, ref value, .. }
            if field == "tenant_id,email" && value == "t1,a@maple.edu"));
    }

    #[tokio::test]
    async fn test_schema_is_enforced() {
        let store = MemoryStore::new();
        let mut record = tenant("maple");
        record.remove("owner_email");
        let err = store.create(Collection::Tenants, record).await.unwrap_err();
        assert_eq!(err.code(), "missing_field");

        let mut record = tenant("maple");
        record.insert("plan".into(), json!("gold"));
        assert_eq!(store.create(Collection::Tenants, record).await.unwrap_err().code(), "invalid_field");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_merges_and_protects_system_fields() {
        let store = MemoryStore::new();
        let created = store.create(Collection::Tenants, tenant("maple")).await.unwrap();
        let id = created["id"].as_str().unwrap();

        let patch = into_record(json!({
            "id": "hijack",
            "created_at": "2000-01-01T00:00:00Z",
            "name": "Maple Academy",
            "domain": "maple.edu"
        }))
        .unwrap();
        let updated = store.update(Collection::Tenants, id, patch).await.unwrap();
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["created_at"], created["created_at"]);
        assert_eq!(updated["name"], "Maple Academy");
        assert_eq!(updated["slug"], "maple");

        let cleared = store
            .update(Collection::Tenants, id, into_record(json!({"domain": null})).unwrap())
            .await
            .unwrap();
        assert!(!cleared.contains_key("domain"));

        let err = store
            .update(Collection::Tenants, id, into_record(json!({"slug": null})).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "missing_field");
    }

    #[tokio::test]
    async fn test_update_checks_uniqueness_against_others_only() {
        let store = MemoryStore::new();
        let a = store.create(Collection::Tenants, tenant("maple")).await.unwrap();
        store.create(Collection::Tenants, tenant("birch")).await.unwrap();
        let id = a["id"].as_str().unwrap();

        store
            .update(Collection::Tenants, id, into_record(json!({"slug": "maple"})).unwrap())
            .await
            .unwrap();
        let err = store
            .update(Collection::Tenants, id, into_record(json!({"slug": "birch"})).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_entry");
    }

    #[tokio::test]
    async fn test_list_breaks_ties_by_id() {
        let store = MemoryStore::new();
        for (slug, id) in [("c", "ten_3"), ("a", "ten_1"), ("b", "ten_2")] {
            let mut record = tenant(slug);
            record.insert("id".into(), json!(id));
            record.insert("created_at".into(), json!("2026-01-01T00:00:00Z"));
            store.create(Collection::Tenants, record).await.unwrap();
        }

        let all = store.list(Collection::Tenants, &ListQuery::new()).await.unwrap();
        let slugs: Vec<_> = all.items.iter().map(|r| r["slug"].as_str().unwrap()).collect();
        assert_eq!(slugs, vec!["a", "b", "c"]);

        let by_plan = store
            .list(Collection::Tenants, &ListQuery::new().sort("-plan"))
            .await
            .unwrap();
        let ids: Vec<_> = by_plan.items.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["ten_1", "ten_2", "ten_3"]);

        let sorted = store
            .list(Collection::Tenants, &ListQuery::new().sort("-slug").filter("slug != 'c'"))
            .await
            .unwrap();
        let slugs: Vec<_> = sorted.items.iter().map(|r| r["slug"].as_str().unwrap()).collect();
        assert_eq!(slugs, vec!["b", "a"]);

        assert_eq!(store.count(Collection::Tenants, Some("slug = 'a'")).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Users, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let created = store.create(Collection::Tenants, tenant("maple")).await.unwrap();
        let id = created["id"].as_str().unwrap();

        let deleted = store.delete(Collection::Tenants, id).await.unwrap();
        assert_eq!(deleted["slug"], "maple");
        assert!(store.get(Collection::Tenants, id).await.unwrap().is_none());

        let err = store.delete(Collection::Tenants, id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
