//! Record types for every collection.
//!
//! Each struct mirrors one collection. All of them deserialize leniently
//! (missing fields take their defaults) because records may be written
//! through the generic collection API before a typed service reads them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::collection::Collection;
use crate::repository::Model;

/// Declares a snake_case string enum with `as_str`, `Display`, `FromStr`
/// and the list of accepted values.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every accepted value, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            /// The wire name of this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::OwnerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(crate::error::OwnerError::invalid_field(
                        stringify!($name),
                        format!("unknown value '{}', expected one of {:?}", other, Self::VALUES),
                    )),
                }
            }
        }
    };
}

macro_rules! impl_model {
    ($ty:ty, $collection:expr) => {
        impl Model for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ==================== Tenants ====================

string_enum! {
    /// Subscription plan of a tenant.
    Plan {
        #[default]
        Free => "free",
        Basic => "basic",
        Pro => "pro",
        Enterprise => "enterprise",
    }
}

impl Plan {
    /// Seat limit for the plan; 0 means unlimited.
    pub fn default_max_students(&self) -> u32 {
        match self {
            Plan::Free => 50,
            Plan::Basic => 500,
            Plan::Pro => 2_500,
            Plan::Enterprise => 0,
        }
    }
}

string_enum! {
    /// Lifecycle status of a tenant.
    TenantStatus {
        #[default]
        Trial => "trial",
        Active => "active",
        Suspended => "suspended",
        Cancelled => "cancelled",
    }
}

/// A customer organization (school).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub plan: Plan,
    pub status: TenantStatus,
    pub owner_email: String,
    pub domain: Option<String>,
    pub domain_verified: bool,
    pub domain_verification_token: Option<String>,
    pub domain_verified_at: Option<DateTime<Utc>>,
    pub student_count: u32,
    /// Seat limit; 0 means unlimited.
    pub max_students: u32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub settings: Map<String, Value>,
    /// Source tenant when this tenant was produced by cloning.
    pub cloned_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Creates a trial tenant with plan defaults.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        owner_email: impl Into<String>,
        plan: Plan,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            slug: slug.into(),
            plan,
            status: TenantStatus::Trial,
            owner_email: owner_email.into(),
            max_students: plan.default_max_students(),
            trial_ends_at: Some(now + Duration::days(14)),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Seat utilisation in `0.0..`, or `None` for unlimited plans.
    pub fn seat_utilization(&self) -> Option<f64> {
        (self.max_students > 0).then(|| self.student_count as f64 / self.max_students as f64)
    }
}

impl_model!(Tenant, Collection::Tenants);

// ==================== Users ====================

string_enum! {
    /// Role of a user inside a tenant.
    UserRole {
        Owner => "owner",
        Admin => "admin",
        #[default]
        Teacher => "teacher",
        Student => "student",
        Parent => "parent",
    }
}

/// A user belonging to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates an active user.
    pub fn new(tenant_id: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            email: email.into(),
            role,
            active: true,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }
}

impl_model!(User, Collection::Users);

// ==================== Invoices ====================

string_enum! {
    /// Invoice status.
    InvoiceStatus {
        Draft => "draft",
        #[default]
        Pending => "pending",
        Paid => "paid",
        Overdue => "overdue",
        Void => "void",
        Refunded => "refunded",
    }
}

impl InvoiceStatus {
    /// Pending or overdue: money still owed.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Overdue)
    }
}

/// A billing invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: String,
    pub number: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_model!(Invoice, Collection::Invoices);

// ==================== Webhooks ====================

string_enum! {
    /// How retry delays grow between attempts.
    Backoff {
        #[default]
        Exponential => "exponential",
        Linear => "linear",
        Fixed => "fixed",
    }
}

/// Retry policy stored on each webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
        }
    }
}

/// An outbound webhook subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Webhook {
    pub id: String,
    /// Owning tenant; `None` for platform-wide subscriptions.
    pub tenant_id: Option<String>,
    pub url: String,
    pub secret: String,
    /// Event patterns (`*`, `invoice.*`, `support_ticket.created`).
    pub events: Vec<String>,
    pub active: bool,
    pub description: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
    pub retry_policy: RetryPolicy,
    pub consecutive_failures: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Webhook {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            tenant_id: None,
            url: String::new(),
            secret: String::new(),
            events: vec!["*".to_string()],
            active: true,
            description: None,
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
            retry_policy: RetryPolicy::default(),
            consecutive_failures: 0,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Webhook {
    /// Creates an active webhook subscribed to every event.
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            url: url.into(),
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Scopes the webhook to a tenant.
    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Replaces the event patterns.
    pub fn events(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl_model!(Webhook, Collection::Webhooks);

string_enum! {
    /// State of a webhook delivery.
    DeliveryStatus {
        #[default]
        Pending => "pending",
        Success => "success",
        Retrying => "retrying",
        Failed => "failed",
    }
}

/// One attempt history entry of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebhookDelivery {
    pub id: String,
    pub webhook_id: String,
    pub tenant_id: Option<String>,
    pub event: String,
    pub event_id: String,
    /// The exact JSON body that was signed and sent.
    pub payload: Value,
    pub status: DeliveryStatus,
    /// Number of attempts made so far (1-based).
    pub attempt: u32,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_model!(WebhookDelivery, Collection::WebhookDeliveries);

// ==================== A/B tests ====================

string_enum! {
    /// A/B test status.
    AbTestStatus {
        #[default]
        Draft => "draft",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
    }
}

/// One arm of an A/B test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Variant {
    pub name: String,
    pub weight: u32,
    pub impressions: u64,
    pub conversions: u64,
}

impl Variant {
    /// Creates a variant with no traffic yet.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            ..Default::default()
        }
    }

    /// Conversion rate, 0 without impressions.
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.conversions as f64 / self.impressions as f64
        }
    }
}

/// An experiment across tenants or users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AbTest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: AbTestStatus,
    /// The first variant is the control.
    pub variants: Vec<Variant>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AbTest {
    /// Creates a draft test.
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            variants,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }
}

impl_model!(AbTest, Collection::AbTests);

// ==================== Incidents ====================

string_enum! {
    /// Severity shared by incidents and compliance findings.
    Severity {
        #[default]
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

string_enum! {
    /// Incident response status.
    IncidentStatus {
        #[default]
        Investigating => "investigating",
        Identified => "identified",
        Monitoring => "monitoring",
        Resolved => "resolved",
    }
}

/// A status post on an incident timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IncidentUpdate {
    pub status: IncidentStatus,
    pub message: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A platform incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub affected_tenants: Vec<String>,
    pub updates: Vec<IncidentUpdate>,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Whether the incident touches the tenant.
    pub fn affects(&self, tenant_id: &str) -> bool {
        self.affected_tenants.iter().any(|t| t == tenant_id)
    }
}

impl_model!(Incident, Collection::Incidents);

// ==================== Support tickets ====================

string_enum! {
    /// Support ticket status.
    TicketStatus {
        #[default]
        Open => "open",
        InProgress => "in_progress",
        Waiting => "waiting",
        Resolved => "resolved",
        Closed => "closed",
    }
}

impl TicketStatus {
    /// Still needs work from support.
    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress | TicketStatus::Waiting)
    }

    /// Allowed next statuses.
    pub fn next(&self) -> &'static [TicketStatus] {
        use TicketStatus::*;
        match self {
            Open => &[InProgress, Waiting, Resolved, Closed],
            InProgress => &[Waiting, Resolved, Closed, Open],
            Waiting => &[InProgress, Resolved, Closed],
            Resolved => &[Closed, Open],
            Closed => &[Open],
        }
    }

    /// Whether `to` is reachable in one step.
    pub fn can_transition_to(&self, to: TicketStatus) -> bool {
        self.next().contains(&to)
    }
}

string_enum! {
    /// Support ticket priority.
    TicketPriority {
        Low => "low",
        #[default]
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

/// A support ticket raised by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SupportTicket {
    pub id: String,
    pub tenant_id: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub requester_email: String,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub incident_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupportTicket {
    /// Creates an open ticket.
    pub fn new(
        tenant_id: impl Into<String>,
        subject: impl Into<String>,
        description: impl Into<String>,
        requester_email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            subject: subject.into(),
            description: description.into(),
            requester_email: requester_email.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }
}

impl_model!(SupportTicket, Collection::SupportTickets);

// ==================== Compliance ====================

string_enum! {
    /// Regulatory framework a report is scored against.
    Framework {
        #[default]
        Ferpa => "ferpa",
        Coppa => "coppa",
        Gdpr => "gdpr",
        Soc2 => "soc2",
    }
}

string_enum! {
    /// Overall compliance verdict.
    ComplianceStatus {
        #[default]
        Compliant => "compliant",
        NeedsAttention => "needs_attention",
        NonCompliant => "non_compliant",
    }
}

/// A single compliance finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Finding {
    pub code: String,
    pub severity: Severity,
    pub description: String,
    pub resolved: bool,
}

/// A scored compliance report for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComplianceReport {
    pub id: String,
    pub tenant_id: String,
    pub framework: Framework,
    pub score: u32,
    pub status: ComplianceStatus,
    pub findings: Vec<Finding>,
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_model!(ComplianceReport, Collection::ComplianceReports);

// ==================== Audit ====================

/// An audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuditLog {
    pub id: String,
    pub tenant_id: Option<String>,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditLog {
    /// Creates an entry stamped now.
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            actor: actor.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            details: Value::Null,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }
}

impl_model!(AuditLog, Collection::AuditLogs);

// ==================== API keys ====================

/// A hashed API key issued to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiKey {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Leading characters of the plaintext key, for display.
    pub prefix: String,
    /// Hex SHA-256 of the plaintext key.
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl_model!(ApiKey, Collection::ApiKeys);
