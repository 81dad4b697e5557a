//! Collection schemas.
//!
//! Every collection has a fixed schema: typed fields, required flags and
//! unique constraints. Stores call [`CollectionSchema::check`] before writing
//! and use [`CollectionSchema::unique_keys`] to enforce uniqueness.

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use crate::collection::Collection;
use crate::error::{OwnerError, OwnerResult};
use crate::store::Record;
use crate::types::{
    AbTestStatus, ComplianceStatus, DeliveryStatus, Framework, IncidentStatus, InvoiceStatus, Plan,
    Severity, TenantStatus, TicketPriority, TicketStatus, UserRole,
};

/// Fields every collection carries and the store manages.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// A complete collection definition.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionSchema {
    pub collection: Collection,
    pub fields: Vec<Field>,
    /// Unique constraints; each is a list of field names.
    pub unique: Vec<Vec<&'static str>>,
}

impl CollectionSchema {
    /// Creates an empty schema.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            fields: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a unique constraint over one or more fields.
    pub fn unique(mut self, fields: &[&'static str]) -> Self {
        self.unique.push(fields.to_vec());
        self
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks required fields and value types.
    ///
    /// Unknown keys are kept as-is; `null` counts as absent.
    pub fn check(&self, record: &Record) -> OwnerResult<()> {
        for field in &self.fields {
            let value = record.get(field.name).unwrap_or(&Value::Null);
            if is_blank(value) {
                if field.required {
                    return Err(OwnerError::MissingField {
                        field: field.name.to_string(),
                    });
                }
                continue;
            }
            field.field_type.check(field.name, value)?;
        }
        Ok(())
    }

    /// Values of each unique constraint for a record.
    ///
    /// A constraint with any null member yields no key: null never collides.
    pub fn unique_keys(&self, record: &Record) -> Vec<(String, Vec<Value>)> {
        self.unique
            .iter()
            .filter_map(|fields| {
                let values: Option<Vec<Value>> = fields
                    .iter()
                    .map(|f| record.get(*f).filter(|v| !v.is_null()).cloned())
                    .collect();
                values.map(|v| (fields.join(","), v))
            })
            .collect()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A typed field of a collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

impl Field {
    /// Creates a required field.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
        }
    }

    /// Creates an optional field.
    pub fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
        }
    }
}

/// Supported field types.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    Bool,
    /// RFC 3339 timestamp.
    Date,
    /// Any JSON value.
    Json,
    /// Id of a record in another collection.
    Relation(Collection),
    /// One of a fixed set of strings.
    Select(&'static [&'static str]),
}

impl FieldType {
    fn check(&self, name: &str, value: &Value) -> OwnerResult<()> {
        let reason = match self {
            FieldType::Json => return Ok(()),
            FieldType::Text if value.is_string() => return Ok(()),
            FieldType::Relation(_) if value.is_string() => return Ok(()),
            FieldType::Number if value.is_number() => return Ok(()),
            FieldType::Bool if value.is_boolean() => return Ok(()),
            FieldType::Date
                if value
                    .as_str()
                    .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()) =>
            {
                return Ok(());
            }
            FieldType::Select(options) if value.as_str().is_some_and(|s| options.contains(&s)) => {
                return Ok(());
            }
            FieldType::Text => "expected a string".to_string(),
            FieldType::Relation(target) => format!("expected a {} id", target),
            FieldType::Number => "expected a number".to_string(),
            FieldType::Bool => "expected a boolean".to_string(),
            FieldType::Date => "expected an RFC 3339 timestamp".to_string(),
            FieldType::Select(options) => format!("expected one of {}", options.join(", ")),
        };
        Err(OwnerError::invalid_field(name, reason))
    }
}

/// The schema of a collection.
pub fn schema_for(collection: Collection) -> CollectionSchema {
    use FieldType::*;

    let schema = CollectionSchema::new(collection);
    match collection {
        Collection::Tenants => schema
            .field(Field::new("name", Text))
            .field(Field::new("slug", Text))
            .field(Field::new("plan", Select(Plan::VALUES)))
            .field(Field::new("status", Select(TenantStatus::VALUES)))
            .field(Field::new("owner_email", Text))
            .field(Field::optional("domain", Text))
            .field(Field::optional("domain_verified", Bool))
            .field(Field::optional("domain_verification_token", Text))
            .field(Field::optional("domain_verified_at", Date))
            .field(Field::optional("student_count", Number))
            .field(Field::optional("max_students", Number))
            .field(Field::optional("trial_ends_at", Date))
            .field(Field::optional("last_active_at", Date))
            .field(Field::optional("settings", Json))
            .field(Field::optional("cloned_from", Relation(Collection::Tenants)))
            .unique(&["slug"])
            .unique(&["domain"]),
        Collection::Users => schema
            .field(Field::new("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("email", Text))
            .field(Field::optional("name", Text))
            .field(Field::new("role", Select(UserRole::VALUES)))
            .field(Field::optional("active", Bool))
            .field(Field::optional("last_login_at", Date))
            .unique(&["tenant_id", "email"]),
        Collection::Invoices => schema
            .field(Field::new("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("number", Text))
            .field(Field::new("amount_cents", Number))
            .field(Field::new("currency", Text))
            .field(Field::new("status", Select(InvoiceStatus::VALUES)))
            .field(Field::optional("period_start", Date))
            .field(Field::optional("period_end", Date))
            .field(Field::new("due_date", Date))
            .field(Field::optional("paid_at", Date))
            .field(Field::optional("checkout_session_id", Text))
            .unique(&["number"])
            .unique(&["checkout_session_id"]),
        Collection::Webhooks => schema
            .field(Field::optional("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("url", Text))
            .field(Field::new("secret", Text))
            .field(Field::optional("events", Json))
            .field(Field::optional("active", Bool))
            .field(Field::optional("description", Text))
            .field(Field::optional("headers", Json))
            .field(Field::optional("timeout_ms", Number))
            .field(Field::optional("retry_policy", Json))
            .field(Field::optional("consecutive_failures", Number))
            .field(Field::optional("last_triggered_at", Date)),
        Collection::AbTests => schema
            .field(Field::new("name", Text))
            .field(Field::optional("description", Text))
            .field(Field::new("status", Select(AbTestStatus::VALUES)))
            .field(Field::optional("variants", Json))
            .field(Field::optional("started_at", Date))
            .field(Field::optional("ended_at", Date))
            .field(Field::optional("winner", Text)),
        Collection::Incidents => schema
            .field(Field::new("title", Text))
            .field(Field::optional("description", Text))
            .field(Field::new("severity", Select(Severity::VALUES)))
            .field(Field::new("status", Select(IncidentStatus::VALUES)))
            .field(Field::optional("affected_tenants", Json))
            .field(Field::optional("updates", Json))
            .field(Field::optional("started_at", Date))
            .field(Field::optional("resolved_at", Date)),
        Collection::SupportTickets => schema
            .field(Field::new("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("subject", Text))
            .field(Field::optional("description", Text))
            .field(Field::new("status", Select(TicketStatus::VALUES)))
            .field(Field::new("priority", Select(TicketPriority::VALUES)))
            .field(Field::new("requester_email", Text))
            .field(Field::optional("assignee", Text))
            .field(Field::optional("tags", Json))
            .field(Field::optional("first_response_at", Date))
            .field(Field::optional("resolved_at", Date))
            .field(Field::optional("closed_at", Date))
            .field(Field::optional("incident_id", Relation(Collection::Incidents))),
        Collection::ComplianceReports => schema
            .field(Field::new("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("framework", Select(Framework::VALUES)))
            .field(Field::new("score", Number))
            .field(Field::new("status", Select(ComplianceStatus::VALUES)))
            .field(Field::optional("findings", Json))
            .field(Field::optional("generated_by", Text)),
        Collection::AuditLogs => schema
            .field(Field::optional("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("actor", Text))
            .field(Field::new("action", Text))
            .field(Field::new("resource_type", Text))
            .field(Field::optional("resource_id", Text))
            .field(Field::optional("details", Json)),
        Collection::ApiKeys => schema
            .field(Field::new("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("name", Text))
            .field(Field::new("prefix", Text))
            .field(Field::new("key_hash", Text))
            .field(Field::optional("scopes", Json))
            .field(Field::optional("expires_at", Date))
            .field(Field::optional("last_used_at", Date))
            .field(Field::optional("revoked", Bool))
            .unique(&["key_hash"]),
        Collection::WebhookDeliveries => schema
            .field(Field::new("webhook_id", Relation(Collection::Webhooks)))
            .field(Field::optional("tenant_id", Relation(Collection::Tenants)))
            .field(Field::new("event", Text))
            .field(Field::optional("event_id", Text))
            .field(Field::optional("payload", Json))
            .field(Field::new("status", Select(DeliveryStatus::VALUES)))
            .field(Field::optional("attempt", Number))
            .field(Field::optional("response_status", Number))
            .field(Field::optional("response_body", Text))
            .field(Field::optional("error", Text))
            .field(Field::optional("duration_ms", Number))
            .field(Field::optional("next_retry_at", Date)),
    }
}

/// Schemas of all collections.
pub fn all_schemas() -> Vec<CollectionSchema> {
    Collection::ALL.into_iter().map(schema_for).collect()
}
