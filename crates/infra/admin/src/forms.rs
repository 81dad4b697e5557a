//! Form rules for records written through the API.
//!
//! Create forms enforce required fields; update forms check only the fields
//! a patch actually carries.

use owner_core::{
    AbTest, AbTestStatus, ApiKey, AuditLog, Collection, ComplianceReport, ComplianceStatus, DeliveryStatus, Finding,
    Framework, Incident, IncidentStatus, IncidentUpdate, Invoice, InvoiceStatus, OwnerError, OwnerResult, Plan,
    Record, RetryPolicy, Rule, Severity, SupportTicket, Tenant, TenantStatus, TicketPriority, TicketStatus, User,
    UserRole, Validator, Variant, Webhook, WebhookDelivery, sanitize_record,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

struct FormField {
    name: &'static str,
    required: bool,
    rules: Vec<Rule>,
}

fn required(name: &'static str, rules: Vec<Rule>) -> FormField {
    FormField {
        name,
        required: true,
        rules,
    }
}

fn optional(name: &'static str, rules: Vec<Rule>) -> FormField {
    FormField {
        name,
        required: false,
        rules,
    }
}

fn text(max: usize) -> Vec<Rule> {
    vec![Rule::MaxLength(max)]
}

fn one_of(values: &[&str]) -> Vec<Rule> {
    vec![Rule::one_of(values.iter().copied())]
}

fn count(max: f64) -> Vec<Rule> {
    vec![Rule::WholeNumber, Rule::Range { min: 0.0, max }]
}

fn decodes<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

fn shape(accepts: fn(&Value) -> bool, message: &'static str) -> Vec<Rule> {
    vec![Rule::Shape { accepts, message }]
}

fn fields(collection: Collection) -> Vec<FormField> {
    match collection {
        Collection::Tenants => vec![
            required("name", vec![Rule::MinLength(2), Rule::MaxLength(120)]),
            required("slug", vec![Rule::Slug, Rule::MinLength(3), Rule::MaxLength(48)]),
            required("owner_email", vec![Rule::Email]),
            optional("plan", one_of(Plan::VALUES)),
            optional("status", one_of(TenantStatus::VALUES)),
            optional("student_count", count(10_000_000.0)),
            optional("max_students", count(10_000_000.0)),
            optional("settings", shape(Value::is_object, "must be an object")),
        ],
        Collection::Users => vec![
            required("tenant_id", vec![]),
            required("email", vec![Rule::Email]),
            optional("name", text(120)),
            required("role", one_of(UserRole::VALUES)),
        ],
        Collection::Invoices => vec![
            required("tenant_id", vec![]),
            required("number", text(64)),
            required("amount_cents", count(100_000_000.0)),
            required("currency", vec![Rule::MinLength(3), Rule::MaxLength(3)]),
            required("status", one_of(InvoiceStatus::VALUES)),
            required("due_date", vec![]),
        ],
        Collection::Webhooks => vec![
            required("url", vec![Rule::Url { https_only: false }]),
            required("secret", vec![Rule::MinLength(16)]),
            optional("description", text(500)),
            optional("timeout_ms", vec![Rule::WholeNumber, Rule::Range { min: 100.0, max: 60_000.0 }]),
            optional("events", vec![Rule::StringList]),
            optional("headers", vec![Rule::StringMap]),
            optional(
                "retry_policy",
                shape(decodes::<RetryPolicy>, "must be a retry policy object"),
            ),
            optional("consecutive_failures", count(u32::MAX as f64)),
        ],
        Collection::AbTests => vec![
            required("name", vec![Rule::MinLength(2), Rule::MaxLength(120)]),
            optional("description", text(2_000)),
            optional("status", one_of(AbTestStatus::VALUES)),
            optional("variants", shape(decodes::<Vec<Variant>>, "must be a list of variants")),
        ],
        Collection::Incidents => vec![
            required("title", vec![Rule::MinLength(3), Rule::MaxLength(200)]),
            optional("description", text(10_000)),
            required("severity", one_of(Severity::VALUES)),
            optional("status", one_of(IncidentStatus::VALUES)),
            optional("affected_tenants", vec![Rule::StringList]),
            optional("updates", shape(decodes::<Vec<IncidentUpdate>>, "must be a list of timeline updates")),
        ],
        Collection::SupportTickets => vec![
            required("tenant_id", vec![]),
            required("subject", vec![Rule::MinLength(3), Rule::MaxLength(200)]),
            optional("description", text(10_000)),
            optional("status", one_of(TicketStatus::VALUES)),
            optional("priority", one_of(TicketPriority::VALUES)),
            required("requester_email", vec![Rule::Email]),
            optional("tags", vec![Rule::StringList]),
        ],
        Collection::ComplianceReports => vec![
            required("tenant_id", vec![]),
            required("framework", one_of(Framework::VALUES)),
            optional("score", count(100.0)),
            optional("status", one_of(ComplianceStatus::VALUES)),
            optional("findings", shape(decodes::<Vec<Finding>>, "must be a list of findings")),
        ],
        Collection::AuditLogs => vec![
            required("actor", text(200)),
            required("action", text(200)),
            required("resource_type", text(100)),
        ],
        Collection::ApiKeys => vec![
            required("tenant_id", vec![]),
            required("name", vec![Rule::MinLength(2), Rule::MaxLength(80)]),
            optional("scopes", vec![Rule::StringList]),
        ],
        Collection::WebhookDeliveries => vec![
            required("webhook_id", vec![]),
            required("event", text(200)),
            optional("status", one_of(DeliveryStatus::VALUES)),
            optional("attempt", count(u32::MAX as f64)),
            optional("response_status", count(999.0)),
            optional("duration_ms", vec![Rule::WholeNumber]),
        ],
    }
}

fn build(collection: Collection, enforce_required: bool) -> Validator {
    fields(collection).into_iter().fold(Validator::new(), |validator, field| {
        let mut rules = field.rules;
        if enforce_required && field.required {
            rules.insert(0, Rule::Required);
        }
        validator.field(field.name, rules)
    })
}

/// Rules for a new record.
pub fn create_form(collection: Collection) -> Validator {
    build(collection, true)
}

/// Rules for a partial update.
pub fn update_form(collection: Collection) -> Validator {
    build(collection, false)
}

/// Sanitizes then validates a new record.
pub fn prepare_create(collection: Collection, record: Record) -> OwnerResult<Record> {
    let record = sanitize_record(record);
    create_form(collection).validate(&Value::Object(record.clone()))?;
    Ok(record)
}

/// Sanitizes then validates a patch.
pub fn prepare_update(collection: Collection, patch: Record) -> OwnerResult<Record> {
    let patch = sanitize_record(patch);
    update_form(collection).validate(&Value::Object(patch.clone()))?;
    Ok(patch)
}

fn model_decodes<T: DeserializeOwned>(record: &Record) -> Result<(), serde_json::Error> {
    T::deserialize(&Value::Object(record.clone())).map(|_| ())
}

/// Checks that a full record still reads back as its typed model.
///
/// Services decode whole collections at once, so one record that does not
/// decode would break every read of its collection.
pub fn check_model(collection: Collection, record: &Record) -> OwnerResult<()> {
    let decoded = match collection {
        Collection::Tenants => model_decodes::<Tenant>(record),
        Collection::Users => model_decodes::<User>(record),
        Collection::Invoices => model_decodes::<Invoice>(record),
        Collection::Webhooks => model_decodes::<Webhook>(record),
        Collection::AbTests => model_decodes::<AbTest>(record),
        Collection::Incidents => model_decodes::<Incident>(record),
        Collection::SupportTickets => model_decodes::<SupportTicket>(record),
        Collection::ComplianceReports => model_decodes::<ComplianceReport>(record),
        Collection::AuditLogs => model_decodes::<AuditLog>(record),
        Collection::ApiKeys => model_decodes::<ApiKey>(record),
        Collection::WebhookDeliveries => model_decodes::<WebhookDelivery>(record),
    };
    decoded.map_err(|e| OwnerError::invalid_field(collection.as_str(), e.to_string()))
}
