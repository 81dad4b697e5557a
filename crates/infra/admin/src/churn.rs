//! Churn risk scoring.

use chrono::{DateTime, Duration, Utc};
use owner_core::{
    Invoice, InvoiceStatus, OwnerResult, RecordService, SupportTicket, Tenant, TenantStatus, quote,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tenants::open_ticket_filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            60.. => RiskLevel::High,
            30..=59 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = owner_core::OwnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(owner_core::OwnerError::invalid_field(
                "level",
                format!("unknown risk level '{}'", other),
            )),
        }
    }
}

/// One reason a tenant scored points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub code: String,
    pub points: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnRisk {
    pub tenant_id: String,
    pub tenant_name: String,
    /// 0 to 100.
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

/// Scores one tenant from its own record and related counts.
pub fn assess(tenant: &Tenant, overdue_invoices: usize, open_tickets: usize, now: DateTime<Utc>) -> ChurnRisk {
    let mut factors = Vec::new();
    let mut add = |code: &str, points: u32, description: String| {
        factors.push(RiskFactor {
            code: code.to_string(),
            points,
            description,
        });
    };

    match tenant.last_active_at {
        None => add("inactive", 30, "no recorded activity".to_string()),
        Some(at) if now - at > Duration::days(30) => {
            add("inactive", 30, format!("inactive for {} days", (now - at).num_days()))
        }
        Some(at) if now - at > Duration::days(14) => {
            add("inactive", 15, format!("inactive for {} days", (now - at).num_days()))
        }
        Some(_) => {}
    }

    match overdue_invoices {
        0 => {}
        1 => add("overdue_invoices", 20, "1 overdue invoice".to_string()),
        n => add("overdue_invoices", 35, format!("{} overdue invoices", n)),
    }

    if open_tickets >= 3 {
        add("open_tickets", 15, format!("{} open support tickets", open_tickets));
    }

    if let Some(utilization) = tenant.seat_utilization() {
        let percent = (utilization * 100.0).round();
        if utilization < 0.25 {
            add("low_utilization", 15, format!("{}% of seats in use", percent));
        } else if utilization < 0.5 {
            add("low_utilization", 5, format!("{}% of seats in use", percent));
        }
    }

    if tenant.status == TenantStatus::Suspended {
        add("suspended", 20, "account is suspended".to_string());
    }
    if tenant.status == TenantStatus::Trial
        && tenant.trial_ends_at.is_some_and(|end| end <= now + Duration::days(7))
    {
        add("trial_ending", 10, "trial ends within 7 days".to_string());
    }

    let score = factors.iter().map(|f| f.points).sum::<u32>().min(100);
    ChurnRisk {
        tenant_id: tenant.id.clone(),
        tenant_name: tenant.name.clone(),
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}

#[derive(Clone)]
pub struct ChurnService {
    records: RecordService,
}

impl ChurnService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    pub async fn score(&self, tenant_id: &str) -> OwnerResult<ChurnRisk> {
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        let scope = format!("tenant_id = {}", quote(tenant_id));
        let overdue = self
            .records
            .repo::<Invoice>()
            .count(Some(&format!("{} && status = {}", scope, quote(InvoiceStatus::Overdue.as_str()))))
            .await?;
        let open = self
            .records
            .repo::<SupportTicket>()
            .count(Some(&format!("{} && {}", scope, open_ticket_filter())))
            .await?;
        Ok(assess(&tenant, overdue, open, Utc::now()))
    }

    /// Non-cancelled tenants at or above `min_level`, riskiest first.
    pub async fn at_risk(&self, min_level: RiskLevel) -> OwnerResult<Vec<ChurnRisk>> {
        let tenants = self
            .records
            .repo::<Tenant>()
            .full_list(Some(&format!("status != {}", quote(TenantStatus::Cancelled.as_str()))))
            .await?;

        let overdue_filter = format!("status = {}", quote(InvoiceStatus::Overdue.as_str()));
        let mut overdue: HashMap<String, usize> = HashMap::new();
        for invoice in self.records.repo::<Invoice>().full_list(Some(&overdue_filter)).await? {
            *overdue.entry(invoice.tenant_id).or_default() += 1;
        }
        let mut open: HashMap<String, usize> = HashMap::new();
        for ticket in self
            .records
            .repo::<SupportTicket>()
            .full_list(Some(&open_ticket_filter()))
            .await?
        {
            *open.entry(ticket.tenant_id).or_default() += 1;
        }

        let now = Utc::now();
        let mut risks: Vec<ChurnRisk> = tenants
            .iter()
            .map(|t| {
                assess(
                    t,
                    overdue.get(&t.id).copied().unwrap_or(0),
                    open.get(&t.id).copied().unwrap_or(0),
                    now,
                )
            })
            .filter(|r| r.level >= min_level)
            .collect();
        risks.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(risks)
    }
}
