//! Audit trail queries and manual entries.

use owner_core::{AuditLog, DEFAULT_PER_PAGE, ListQuery, ListResult, OwnerResult, RecordService, all_of, quote};
use serde::{Deserialize, Serialize};

/// Filters for [`AuditService::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditQuery {
    pub tenant_id: Option<String>,
    pub resource_type: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Reads and writes audit log entries.
#[derive(Clone)]
pub struct AuditService {
    records: RecordService,
}

impl AuditService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// Stores an entry. A blank actor is replaced by the acting principal.
    pub async fn record(&self, mut entry: AuditLog) -> OwnerResult<AuditLog> {
        if entry.actor.trim().is_empty() {
            entry.actor = self.records.actor().to_string();
        }
        self.records.repo::<AuditLog>().create(&entry).await
    }

    /// Entries newest first, optionally scoped to a tenant or resource type.
    pub async fn list(&self, query: &AuditQuery) -> OwnerResult<ListResult<AuditLog>> {
        let filter = all_of([
            query
                .tenant_id
                .as_deref()
                .map(|t| format!("tenant_id = {}", quote(t)))
                .unwrap_or_default(),
            query
                .resource_type
                .as_deref()
                .map(|r| format!("resource_type = {}", quote(r)))
                .unwrap_or_default(),
        ]);

        let list = ListQuery::new()
            .filter(filter)
            .sort("-created_at")
            .page(query.page.unwrap_or(1))
            .per_page(query.per_page.unwrap_or(DEFAULT_PER_PAGE));
        self.records.repo::<AuditLog>().list(&list).await
    }

    /// Every entry about one record, newest first.
    pub async fn for_resource(&self, resource_type: &str, resource_id: &str) -> OwnerResult<Vec<AuditLog>> {
        let filter = format!(
            "resource_type = {} && resource_id = {}",
            quote(resource_type),
            quote(resource_id)
        );
        let mut entries = self.records.repo::<AuditLog>().full_list(Some(&filter)).await?;
        entries.reverse();
        Ok(entries)
    }
}
