//! Record access with lifecycle events.
//!
//! [`RecordService`] is the untyped entry point used by the generic
//! collection API. [`Repository`] wraps it for one typed [`Model`]. Every
//! mutation is followed by a `<resource>.<action>` event on the bus,
//! tagged with the acting principal.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use owner_events::{Event, EventBus, record_actions};

use crate::collection::Collection;
use crate::error::{OwnerError, OwnerResult};
use crate::query::{ListQuery, ListResult, MAX_PER_PAGE};
use crate::schema::SYSTEM_FIELDS;
use crate::store::{CollectionStore, Record, into_record};

/// Actor used when nobody in particular caused a change.
pub const SYSTEM_ACTOR: &str = "system";

/// A typed record stored in one collection.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this model lives in.
    const COLLECTION: Collection;

    /// The record id.
    fn id(&self) -> &str;
}

/// Untyped record access for any collection.
#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn CollectionStore>,
    events: Arc<EventBus>,
    actor: String,
}

impl RecordService {
    /// Creates a service acting as [`SYSTEM_ACTOR`].
    pub fn new(store: Arc<dyn CollectionStore>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            actor: SYSTEM_ACTOR.to_string(),
        }
    }

    /// Returns a copy that attributes changes to `actor`.
    pub fn with_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..self.clone()
        }
    }

    /// The acting principal.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// The event bus mutations are published on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// A typed view over one collection.
    pub fn repo<T: Model>(&self) -> Repository<T> {
        Repository::new(self.clone())
    }

    pub async fn create(&self, collection: Collection, record: Record) -> OwnerResult<Record> {
        let created = self.store.create(collection, record).await?;
        tracing::debug!(collection = %collection, id = ?created.get("id"), "record created");
        self.publish(collection, record_actions::CREATED, &created).await;
        Ok(created)
    }

    pub async fn get(&self, collection: Collection, id: &str) -> OwnerResult<Option<Record>> {
        self.store.get(collection, id).await
    }

    /// Like [`get`](Self::get) but a missing record is `NotFound`.
    pub async fn require(&self, collection: Collection, id: &str) -> OwnerResult<Record> {
        self.store
            .get(collection, id)
            .await?
            .ok_or_else(|| OwnerError::not_found(collection.as_str(), "id", id))
    }

    pub async fn list(&self, collection: Collection, query: &ListQuery) -> OwnerResult<ListResult<Record>> {
        self.store.list(collection, query).await
    }

    /// First record matching a filter in default order.
    pub async fn first(&self, collection: Collection, filter: &str) -> OwnerResult<Option<Record>> {
        let query = ListQuery::new().filter(filter).per_page(1);
        Ok(self.store.list(collection, &query).await?.items.into_iter().next())
    }

    /// Every record matching a filter, fetched in pages of [`MAX_PER_PAGE`].
    pub async fn full_list(
        &self,
        collection: Collection,
        filter: Option<&str>,
        sort: Option<&str>,
    ) -> OwnerResult<Vec<Record>> {
        let mut query = ListQuery::new().per_page(MAX_PER_PAGE);
        query.filter = filter.map(str::to_string);
        query.sort = sort.map(str::to_string);

        let mut all = Vec::new();
        loop {
            let page = self.store.list(collection, &query).await?;
            let done = page.page >= page.total_pages;
            all.extend(page.items);
            if done {
                return Ok(all);
            }
            query.page += 1;
        }
    }

    /// Applies a merge patch and returns the stored record.
    pub async fn update(&self, collection: Collection, id: &str, patch: Record) -> OwnerResult<Record> {
        let updated = self.store.update(collection, id, patch).await?;
        tracing::debug!(collection = %collection, id, "record updated");
        self.publish(collection, record_actions::UPDATED, &updated).await;
        Ok(updated)
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> OwnerResult<Record> {
        let deleted = self.store.delete(collection, id).await?;
        tracing::debug!(collection = %collection, id, "record deleted");
        self.publish(collection, record_actions::DELETED, &deleted).await;
        Ok(deleted)
    }

    pub async fn count(&self, collection: Collection, filter: Option<&str>) -> OwnerResult<usize> {
        self.store.count(collection, filter).await
    }

    /// Publishes a custom event (e.g. `tenant.cloned`) as this actor.
    pub async fn publish_event(&self, event: Event) {
        self.events.emit(event.with_actor(self.actor.clone())).await;
    }

    async fn publish(&self, collection: Collection, action: &str, record: &Record) {
        let mut event = Event::for_record(collection.as_str(), action, record);
        // A tenant record is its own tenant.
        if collection == Collection::Tenants {
            if let Some(id) = record.get("id").and_then(Value::as_str) {
                event = event.with_tenant(id);
            }
        }
        self.publish_event(event).await;
    }
}

/// Typed access to the collection of `T`.
pub struct Repository<T> {
    records: RecordService,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            _model: PhantomData,
        }
    }
}

impl<T: Model> Repository<T> {
    pub fn new(records: RecordService) -> Self {
        Self {
            records,
            _model: PhantomData,
        }
    }

    /// Stores a new model. Timestamps are always stamped by the store.
    pub async fn create(&self, model: &T) -> OwnerResult<T> {
        let mut record = to_record(model)?;
        record.remove("created_at");
        record.remove("updated_at");
        decode(self.records.create(T::COLLECTION, record).await?)
    }

    pub async fn get(&self, id: &str) -> OwnerResult<Option<T>> {
        self.records.get(T::COLLECTION, id).await?.map(decode).transpose()
    }

    pub async fn require(&self, id: &str) -> OwnerResult<T> {
        decode(self.records.require(T::COLLECTION, id).await?)
    }

    pub async fn list(&self, query: &ListQuery) -> OwnerResult<ListResult<T>> {
        self.records.list(T::COLLECTION, query).await?.try_map(decode)
    }

    pub async fn first(&self, filter: &str) -> OwnerResult<Option<T>> {
        self.records.first(T::COLLECTION, filter).await?.map(decode).transpose()
    }

    pub async fn full_list(&self, filter: Option<&str>) -> OwnerResult<Vec<T>> {
        self.records
            .full_list(T::COLLECTION, filter, None)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Writes every non-system field of `model`.
    pub async fn update(&self, model: &T) -> OwnerResult<T> {
        let mut record = to_record(model)?;
        for field in SYSTEM_FIELDS {
            record.remove(field);
        }
        decode(self.records.update(T::COLLECTION, model.id(), record).await?)
    }

    /// Merges a partial JSON object into the record.
    pub async fn patch(&self, id: &str, patch: Value) -> OwnerResult<T> {
        decode(self.records.update(T::COLLECTION, id, into_record(patch)?).await?)
    }

    pub async fn delete(&self, id: &str) -> OwnerResult<T> {
        decode(self.records.delete(T::COLLECTION, id).await?)
    }

    pub async fn count(&self, filter: Option<&str>) -> OwnerResult<usize> {
        self.records.count(T::COLLECTION, filter).await
    }
}

fn to_record<T: Serialize>(model: &T) -> OwnerResult<Record> {
    let mut record = into_record(serde_json::to_value(model)?)?;
    // Empty ids are left for the store to generate.
    if record.get("id").and_then(Value::as_str) == Some("") {
        record.remove("id");
    }
    Ok(record)
}

fn decode<T: DeserializeOwned>(record: Record) -> OwnerResult<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}
