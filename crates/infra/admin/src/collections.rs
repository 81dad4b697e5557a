//! Generic record writes for the collection API.
//!
//! Records go through the same forms as the typed services. Workflow
//! states are owned by their services: a ticket `status` in a patch runs
//! the ticket transition table, and incident or A/B test `status` only
//! moves through `post_update` or `start`/`pause`/`complete`.

use owner_core::{Collection, OwnerError, OwnerResult, Record, RecordService, TicketStatus};
use serde_json::Value;

use crate::forms;
use crate::support::SupportService;

#[derive(Clone)]
pub struct CollectionService {
    records: RecordService,
}

impl CollectionService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// Sanitizes, validates and stores a new record.
    pub async fn create(&self, collection: Collection, record: Record) -> OwnerResult<Record> {
        let record = forms::prepare_create(collection, record)?;
        forms::check_model(collection, &record)?;
        self.records.create(collection, record).await
    }

    /// Sanitizes, validates and merges a patch.
    pub async fn update(&self, collection: Collection, id: &str, patch: Record) -> OwnerResult<Record> {
        let mut patch = forms::prepare_update(collection, patch)?;
        let current = self.records.require(collection, id).await?;

        let mut merged = current.clone();
        merged.extend(patch.clone());
        forms::check_model(collection, &merged)?;

        if is_workflow(collection) {
            if let Some(to) = patch.remove("status") {
                let from = current.get("status").and_then(Value::as_str).unwrap_or_default();
                let to = to.as_str().unwrap_or_default();
                if from != to {
                    self.move_status(collection, id, from, to).await?;
                }
            }
            if patch.is_empty() {
                return self.records.require(collection, id).await;
            }
        }

        self.records.update(collection, id, patch).await
    }

    async fn move_status(&self, collection: Collection, id: &str, from: &str, to: &str) -> OwnerResult<()> {
        match collection {
            Collection::SupportTickets => {
                let to: TicketStatus = to.parse()?;
                SupportService::new(self.records.clone()).transition(id, to).await?;
                Ok(())
            }
            Collection::Incidents => Err(OwnerError::transition("incident", from, to)),
            _ => Err(OwnerError::transition("ab_test", from, to)),
        }
    }
}

fn is_workflow(collection: Collection) -> bool {
    matches!(
        collection,
        Collection::SupportTickets | Collection::Incidents | Collection::AbTests
    )
}
