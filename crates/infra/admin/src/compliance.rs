//! Compliance reports: automated checks and scoring.

use chrono::{Duration, Utc};
use owner_core::{
    ApiKey, AuditLog, ComplianceReport, ComplianceStatus, Finding, Framework, Incident, OwnerError, OwnerResult,
    RecordService, Severity, Tenant, User, UserRole, Webhook, quote,
};

use crate::incidents::IncidentService;

/// Keys older than this are stale.
const KEY_MAX_AGE_DAYS: i64 = 90;
/// A tenant with no audit entries in this window has a gap.
const AUDIT_WINDOW_DAYS: i64 = 30;
/// Admins without a login in this window are inactive.
const ADMIN_IDLE_DAYS: i64 = 90;

/// Points a finding takes off the score.
pub fn finding_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 25,
        Severity::High => 15,
        Severity::Medium => 8,
        Severity::Low => 3,
    }
}

/// `100` minus the weight of every unresolved finding, floored at 0.
pub fn score(findings: &[Finding]) -> u32 {
    let penalty: u32 = findings
        .iter()
        .filter(|f| !f.resolved)
        .map(|f| finding_weight(f.severity))
        .sum();
    100u32.saturating_sub(penalty)
}

pub fn status_for(score: u32) -> ComplianceStatus {
    match score {
        90.. => ComplianceStatus::Compliant,
        70..=89 => ComplianceStatus::NeedsAttention,
        _ => ComplianceStatus::NonCompliant,
    }
}

fn finding(code: &str, severity: Severity, description: String) -> Finding {
    Finding {
        code: code.to_string(),
        severity,
        description,
        resolved: false,
    }
}

#[derive(Clone)]
pub struct ComplianceService {
    records: RecordService,
}

impl ComplianceService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// Runs every check against the tenant and stores a scored report.
    pub async fn generate(&self, tenant_id: &str, framework: Framework, actor: &str) -> OwnerResult<ComplianceReport> {
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        let findings = self.run_checks(&tenant).await?;

        let score = score(&findings);
        let report = ComplianceReport {
            tenant_id: tenant.id.clone(),
            framework,
            score,
            status: status_for(score),
            findings,
            generated_by: actor.to_string(),
            ..Default::default()
        };
        let report = self.records.repo::<ComplianceReport>().create(&report).await?;
        tracing::info!(
            tenant = %tenant.id,
            framework = %framework,
            score = report.score,
            findings = report.findings.len(),
            "compliance report generated"
        );
        Ok(report)
    }

    /// Marks a finding resolved and rescores the report.
    pub async fn resolve_finding(&self, report_id: &str, code: &str) -> OwnerResult<ComplianceReport> {
        let reports = self.records.repo::<ComplianceReport>();
        let mut report = reports.require(report_id).await?;

        let finding = report
            .findings
            .iter_mut()
            .find(|f| f.code == code)
            .ok_or_else(|| OwnerError::not_found("finding", "code", code))?;
        finding.resolved = true;

        report.score = score(&report.findings);
        report.status = status_for(report.score);
        reports.update(&report).await
    }

    async fn run_checks(&self, tenant: &Tenant) -> OwnerResult<Vec<Finding>> {
        let now = Utc::now();
        let scope = format!("tenant_id = {}", quote(&tenant.id));
        let mut findings = Vec::new();

        let insecure: Vec<Webhook> = self
            .records
            .repo::<Webhook>()
            .full_list(Some(&format!("{} && active = true", scope)))
            .await?
            .into_iter()
            .filter(|w| !w.url.trim().to_ascii_lowercase().starts_with("https://"))
            .collect();
        if !insecure.is_empty() {
            findings.push(finding(
                "WEBHOOK_INSECURE_URL",
                Severity::High,
                format!("{} active webhook(s) deliver over plain http", insecure.len()),
            ));
        }

        let keys: Vec<ApiKey> = self
            .records
            .repo::<ApiKey>()
            .full_list(Some(&format!("{} && revoked != true", scope)))
            .await?;
        let stale = keys
            .iter()
            .filter(|k| k.created_at < now - Duration::days(KEY_MAX_AGE_DAYS))
            .count();
        if stale > 0 {
            findings.push(finding(
                "API_KEY_STALE",
                Severity::Medium,
                format!("{} API key(s) older than {} days", stale, KEY_MAX_AGE_DAYS),
            ));
        }
        let no_expiry = keys.iter().filter(|k| k.expires_at.is_none()).count();
        if no_expiry > 0 {
            findings.push(finding(
                "API_KEY_NO_EXPIRY",
                Severity::Low,
                format!("{} API key(s) never expire", no_expiry),
            ));
        }

        let window_start = now - Duration::days(AUDIT_WINDOW_DAYS);
        let recent_audit = self
            .records
            .repo::<AuditLog>()
            .count(Some(&format!(
                "{} && created_at >= {}",
                scope,
                quote(&window_start.to_rfc3339())
            )))
            .await?;
        if recent_audit == 0 {
            findings.push(finding(
                "AUDIT_LOG_GAP",
                Severity::Medium,
                format!("no audit activity in the last {} days", AUDIT_WINDOW_DAYS),
            ));
        }

        if let Some(domain) = tenant.domain.as_deref().filter(|_| !tenant.domain_verified) {
            findings.push(finding(
                "DOMAIN_UNVERIFIED",
                Severity::Low,
                format!("custom domain {} is not verified", domain),
            ));
        }

        let idle_cutoff = now - Duration::days(ADMIN_IDLE_DAYS);
        let idle_admins = self
            .records
            .repo::<User>()
            .full_list(Some(&format!("{} && active = true", scope)))
            .await?
            .into_iter()
            .filter(|u| matches!(u.role, UserRole::Owner | UserRole::Admin))
            .filter(|u| u.last_login_at.unwrap_or(u.created_at) < idle_cutoff)
            .count();
        if idle_admins > 0 {
            findings.push(finding(
                "INACTIVE_ADMIN",
                Severity::Low,
                format!("{} admin account(s) without a login in {} days", idle_admins, ADMIN_IDLE_DAYS),
            ));
        }

        let critical: Vec<Incident> = IncidentService::new(self.records.clone())
            .active_for_tenant(&tenant.id)
            .await?
            .into_iter()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        if let Some(incident) = critical.first() {
            findings.push(finding(
                "OPEN_CRITICAL_INCIDENT",
                Severity::Critical,
                format!("critical incident '{}' is unresolved", incident.title),
            ));
        }

        Ok(findings)
    }
}
