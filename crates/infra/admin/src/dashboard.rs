//! Dashboard summary figures.

use chrono::{Duration, Utc};
use owner_core::{
    AbTest, AbTestStatus, DeliveryStatus, OwnerResult, RecordService, Tenant, TenantStatus, WebhookDelivery, quote,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::billing::{PlanPrices, monthly_recurring_revenue};
use crate::incidents::IncidentService;
use crate::support::SupportService;

/// Headline numbers for the owner dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_tenants: usize,
    pub tenants_by_status: BTreeMap<String, usize>,
    pub mrr_cents: i64,
    pub open_tickets: usize,
    pub active_incidents: usize,
    pub running_tests: usize,
    /// Deliveries that ended failed in the last 24 hours.
    pub failed_deliveries_24h: usize,
}

#[derive(Clone)]
pub struct DashboardService {
    records: RecordService,
    prices: PlanPrices,
}

impl DashboardService {
    pub fn new(records: RecordService, prices: PlanPrices) -> Self {
        Self { records, prices }
    }

    pub async fn summary(&self) -> OwnerResult<DashboardSummary> {
        let tenants = self.records.repo::<Tenant>().full_list(None).await?;
        let mut by_status: BTreeMap<String, usize> = TenantStatus::VALUES
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        for tenant in &tenants {
            *by_status.entry(tenant.status.to_string()).or_insert(0) += 1;
        }

        let open_tickets = SupportService::new(self.records.clone()).open_count(None).await?;
        let active_incidents = IncidentService::new(self.records.clone()).active().await?.len();
        let running_tests = self
            .records
            .repo::<AbTest>()
            .count(Some(&format!("status = {}", quote(AbTestStatus::Running.as_str()))))
            .await?;

        let since = Utc::now() - Duration::hours(24);
        let failed_deliveries_24h = self
            .records
            .repo::<WebhookDelivery>()
            .count(Some(&format!(
                "status = {} && updated_at >= {}",
                quote(DeliveryStatus::Failed.as_str()),
                quote(&since.to_rfc3339())
            )))
            .await?;

        Ok(DashboardSummary {
            total_tenants: tenants.len(),
            tenants_by_status: by_status,
            mrr_cents: monthly_recurring_revenue(&tenants, &self.prices),
            open_tickets,
            active_incidents,
            running_tests,
            failed_deliveries_24h,
        })
    }
}
