//! The fixed set of record collections.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OwnerError, OwnerResult};

/// A record collection in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tenants,
    Users,
    Invoices,
    Webhooks,
    AbTests,
    Incidents,
    SupportTickets,
    ComplianceReports,
    AuditLogs,
    ApiKeys,
    WebhookDeliveries,
}

impl Collection {
    /// Every collection, in schema order.
    pub const ALL: [Collection; 11] = [
        Collection::Tenants,
        Collection::Users,
        Collection::Invoices,
        Collection::Webhooks,
        Collection::AbTests,
        Collection::Incidents,
        Collection::SupportTickets,
        Collection::ComplianceReports,
        Collection::AuditLogs,
        Collection::ApiKeys,
        Collection::WebhookDeliveries,
    ];

    /// The collection name used in URLs, filters and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tenants => "tenants",
            Collection::Users => "users",
            Collection::Invoices => "invoices",
            Collection::Webhooks => "webhooks",
            Collection::AbTests => "ab_tests",
            Collection::Incidents => "incidents",
            Collection::SupportTickets => "support_tickets",
            Collection::ComplianceReports => "compliance_reports",
            Collection::AuditLogs => "audit_logs",
            Collection::ApiKeys => "api_keys",
            Collection::WebhookDeliveries => "webhook_deliveries",
        }
    }

    /// Parses a collection name.
    pub fn parse(name: &str) -> OwnerResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| OwnerError::UnknownCollection(name.to_string()))
    }

    /// Whether mutations of this collection are written to the audit trail.
    pub fn is_audited(&self) -> bool {
        !matches!(self, Collection::AuditLogs | Collection::WebhookDeliveries)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = OwnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
