//! # Owner Console Admin
//!
//! Owner services for the multi-tenant control plane: tenant lifecycle,
//! billing, support, incidents, A/B tests, compliance, churn risk, API keys,
//! audit, cloning and custom domains, plus the lifecycle hooks that tie
//! them together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use owner_admin::{AdminConfig, OwnerAdmin};
//!
//! let admin = OwnerAdmin::new(records, AdminConfig::new(), payments, dns);
//! admin.install_hooks().await;
//!
//! let tenant = admin.tenants().create(form).await?;
//! let risk = admin.churn().score(&tenant.id).await?;
//! ```

mod api_keys;
mod audit;
mod billing;
mod churn;
mod cloning;
mod collections;
mod compliance;
mod dashboard;
mod domains;
pub mod forms;
pub mod hooks;
#[cfg(feature = "http-client")]
mod http;
mod incidents;
mod support;
mod tenants;

pub use ab_tests::*;
pub use api_keys::*;
pub use audit::*;
pub use billing::*;
pub use churn::*;
pub use cloning::*;
pub use collections::CollectionService;
pub use compliance::*;
pub use dashboard::*;
pub use domains::*;
pub use hooks::{AuditTrailHook, IncidentTicketHook};
pub use incidents::*;
pub use support::*;
pub use tenants::{NewTenant, TenantOverview, TenantService};

use owner_core::RecordService;
use std::sync::Arc;

/// Owner services configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Monthly plan prices in cents.
    pub prices: PlanPrices,
    /// ISO currency code on invoices and checkouts.
    pub currency: String,
    /// Length of the trial new tenants start with.
    pub trial_days: i64,
    /// Host label of domain verification records.
    pub domain_record_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            prices: PlanPrices::default(),
            currency: "usd".to_string(),
            trial_days: 14,
            domain_record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
        }
    }
}

impl AdminConfig {
    /// Creates a new admin config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plan prices.
    pub fn prices(mut self, prices: PlanPrices) -> Self {
        self.prices = prices;
        self
    }

    /// Sets the currency.
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Sets the trial length.
    pub fn trial_days(mut self, days: i64) -> Self {
        self.trial_days = days;
        self
    }

    /// Sets the verification record prefix.
    pub fn domain_record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.domain_record_prefix = prefix.into();
        self
    }
}

/// Entry point to every owner service.
///
/// Services are cheap handles over the shared record service; `as_actor`
/// returns a copy whose writes are attributed to someone else.
#[derive(Clone)]
pub struct OwnerAdmin {
    records: RecordService,
    config: AdminConfig,
    payments: Arc<dyn PaymentProvider>,
    dns: Arc<dyn DnsResolver>,
}

impl OwnerAdmin {
    pub fn new(
        records: RecordService,
        config: AdminConfig,
        payments: Arc<dyn PaymentProvider>,
        dns: Arc<dyn DnsResolver>,
    ) -> Self {
        Self {
            records,
            config,
            payments,
            dns,
        }
    }

    /// Same services, acting as `actor`.
    pub fn as_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            records: self.records.with_actor(actor),
            ..self.clone()
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordService {
        &self.records
    }

    /// Registers the audit trail and incident ticket hooks.
    pub async fn install_hooks(&self) {
        hooks::install(self.records.events(), &self.records).await;
    }

    /// Generic record writes under the form and workflow rules.
    pub fn collections(&self) -> CollectionService {
        CollectionService::new(self.records.clone())
    }

    pub fn tenants(&self) -> TenantService {
        TenantService::new(self.records.clone(), self.config.trial_days)
    }

    pub fn billing(&self) -> BillingService {
        BillingService::new(
            self.records.clone(),
            self.payments.clone(),
            self.config.prices,
            self.config.currency.clone(),
        )
    }

    pub fn support(&self) -> SupportService {
        SupportService::new(self.records.clone())
    }

    pub fn incidents(&self) -> IncidentService {
        IncidentService::new(self.records.clone())
    }

    pub fn ab_tests(&self) -> AbTestService {
        AbTestService::new(self.records.clone())
    }

    pub fn compliance(&self) -> ComplianceService {
        ComplianceService::new(self.records.clone())
    }

    pub fn churn(&self) -> ChurnService {
        ChurnService::new(self.records.clone())
    }

    pub fn api_keys(&self) -> ApiKeyService {
        ApiKeyService::new(self.records.clone())
    }

    pub fn audit(&self) -> AuditService {
        AuditService::new(self.records.clone())
    }

    pub fn cloning(&self) -> CloneService {
        CloneService::new(self.records.clone())
    }

    pub fn domains(&self) -> DomainService {
        DomainService::new(self.records.clone(), self.dns.clone())
            .with_record_prefix(self.config.domain_record_prefix.clone())
    }

    pub fn dashboard(&self) -> DashboardService {
        DashboardService::new(self.records.clone(), self.config.prices)
    }
}
