//! Tenant lifecycle.

use chrono::{Duration, Utc};
use owner_core::{
    ApiKey, AuditLog, Collection, InvoiceStatus, OwnerError, OwnerResult, Plan, RecordService, SupportTicket,
    Tenant, TenantStatus, TicketStatus, User, Webhook, Invoice, quote,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::forms;

/// Input for [`TenantService::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub owner_email: String,
    pub plan: Plan,
    /// Overrides the plan's seat limit.
    pub max_students: Option<u32>,
    pub settings: serde_json::Map<String, Value>,
}

/// Related record counts shown on a tenant's page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantOverview {
    pub tenant: Tenant,
    pub users: usize,
    pub open_tickets: usize,
    pub unpaid_invoices: usize,
    pub active_webhooks: usize,
    pub api_keys: usize,
}

/// Filter matching tickets that still need work.
pub(crate) fn open_ticket_filter() -> String {
    let statuses: Vec<String> = [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Waiting]
        .iter()
        .map(|s| format!("status = {}", quote(s.as_str())))
        .collect();
    format!("({})", statuses.join(" || "))
}

/// Filter matching invoices with money still owed.
pub(crate) fn unpaid_invoice_filter() -> String {
    format!(
        "(status = {} || status = {})",
        quote(InvoiceStatus::Pending.as_str()),
        quote(InvoiceStatus::Overdue.as_str())
    )
}

fn for_tenant(tenant_id: &str, rest: &str) -> String {
    format!("tenant_id = {} && {}", quote(tenant_id), rest)
}

/// Creates tenants and moves them through their lifecycle.
#[derive(Clone)]
pub struct TenantService {
    records: RecordService,
    trial_days: i64,
}

impl TenantService {
    pub fn new(records: RecordService, trial_days: i64) -> Self {
        Self { records, trial_days }
    }

    /// Validates the form and creates a trial tenant.
    pub async fn create(&self, form: Value) -> OwnerResult<Tenant> {
        let record = forms::prepare_create(Collection::Tenants, owner_core::into_record(form)?)?;
        let input: NewTenant = serde_json::from_value(Value::Object(record))?;

        let mut tenant = Tenant::new(input.name, input.slug, input.owner_email, input.plan);
        tenant.trial_ends_at = Some(Utc::now() + Duration::days(self.trial_days));
        if let Some(max) = input.max_students {
            tenant.max_students = max;
        }
        tenant.settings = input.settings;

        let tenant = self.records.repo::<Tenant>().create(&tenant).await?;
        tracing::info!(tenant = %tenant.id, slug = %tenant.slug, plan = %tenant.plan, "tenant created");
        Ok(tenant)
    }

    pub async fn get(&self, id: &str) -> OwnerResult<Tenant> {
        self.records.repo::<Tenant>().require(id).await
    }

    /// Suspends a trial or active tenant.
    pub async fn suspend(&self, id: &str, reason: Option<&str>) -> OwnerResult<Tenant> {
        let tenant = self.get(id).await?;
        if !matches!(tenant.status, TenantStatus::Trial | TenantStatus::Active) {
            return Err(OwnerError::transition("tenant", tenant.status, TenantStatus::Suspended));
        }

        let tenant = self.set_status(&tenant, TenantStatus::Suspended).await?;
        self.audit(&tenant, "tenant.suspended", json!({ "reason": reason })).await?;
        tracing::info!(tenant = %tenant.id, reason = reason.unwrap_or(""), "tenant suspended");
        Ok(tenant)
    }

    /// Returns a suspended or trial tenant to active. Cancelled tenants stay cancelled.
    pub async fn reactivate(&self, id: &str) -> OwnerResult<Tenant> {
        let tenant = self.get(id).await?;
        match tenant.status {
            TenantStatus::Active => Ok(tenant),
            TenantStatus::Cancelled => Err(OwnerError::transition("tenant", tenant.status, TenantStatus::Active)),
            TenantStatus::Trial | TenantStatus::Suspended => {
                let tenant = self.set_status(&tenant, TenantStatus::Active).await?;
                self.audit(&tenant, "tenant.reactivated", Value::Null).await?;
                tracing::info!(tenant = %tenant.id, "tenant reactivated");
                Ok(tenant)
            }
        }
    }

    pub async fn cancel(&self, id: &str) -> OwnerResult<Tenant> {
        let tenant = self.get(id).await?;
        if tenant.status == TenantStatus::Cancelled {
            return Err(OwnerError::transition("tenant", tenant.status, TenantStatus::Cancelled));
        }

        let tenant = self.set_status(&tenant, TenantStatus::Cancelled).await?;
        self.audit(&tenant, "tenant.cancelled", Value::Null).await?;
        tracing::info!(tenant = %tenant.id, "tenant cancelled");
        Ok(tenant)
    }

    /// Moves a tenant to another plan and resets its seat limit.
    pub async fn change_plan(&self, id: &str, plan: Plan) -> OwnerResult<Tenant> {
        let tenant = self.get(id).await?;
        if tenant.status == TenantStatus::Cancelled {
            return Err(OwnerError::conflict("cannot change the plan of a cancelled tenant"));
        }
        if tenant.plan == plan {
            return Ok(tenant);
        }

        let previous = tenant.plan;
        let tenant = self
            .records
            .repo::<Tenant>()
            .patch(
                id,
                json!({ "plan": plan, "max_students": plan.default_max_students() }),
            )
            .await?;
        self.audit(&tenant, "tenant.plan_changed", json!({ "from": previous, "to": plan }))
            .await?;
        tracing::info!(tenant = %tenant.id, from = %previous, to = %plan, "tenant plan changed");
        Ok(tenant)
    }

    /// Records that the tenant was just active.
    pub async fn touch_activity(&self, id: &str) -> OwnerResult<Tenant> {
        self.records
            .repo::<Tenant>()
            .patch(id, json!({ "last_active_at": Utc::now() }))
            .await
    }

    pub async fn overview(&self, id: &str) -> OwnerResult<TenantOverview> {
        let tenant = self.get(id).await?;
        let tenant_filter = format!("tenant_id = {}", quote(id));

        let users = self.records.repo::<User>().count(Some(&tenant_filter)).await?;
        let open_tickets = self
            .records
            .repo::<SupportTicket>()
            .count(Some(&for_tenant(id, &open_ticket_filter())))
            .await?;
        let unpaid_invoices = self
            .records
            .repo::<Invoice>()
            .count(Some(&for_tenant(id, &unpaid_invoice_filter())))
            .await?;
        let active_webhooks = self
            .records
            .repo::<Webhook>()
            .count(Some(&for_tenant(id, "active = true")))
            .await?;
        let api_keys = self
            .records
            .repo::<ApiKey>()
            .count(Some(&for_tenant(id, "revoked != true")))
            .await?;

        Ok(TenantOverview {
            tenant,
            users,
            open_tickets,
            unpaid_invoices,
            active_webhooks,
            api_keys,
        })
    }

    async fn set_status(&self, tenant: &Tenant, status: TenantStatus) -> OwnerResult<Tenant> {
        self.records
            .repo::<Tenant>()
            .patch(&tenant.id, json!({ "status": status }))
            .await
    }

    async fn audit(&self, tenant: &Tenant, action: &str, details: Value) -> OwnerResult<()> {
        let mut entry = AuditLog::new(self.records.actor(), action, Collection::Tenants.as_str(), &tenant.id);
        entry.tenant_id = Some(tenant.id.clone());
        entry.details = details;
        self.records.repo::<AuditLog>().create(&entry).await?;
        Ok(())
    }
}
