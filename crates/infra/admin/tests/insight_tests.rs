mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::harness;
use owner_admin::{CloneOptions, NewIncident, RiskLevel};
use owner_core::{
    AbTestStatus, ApiKey, AuditLog, Collection, ComplianceStatus, DeliveryStatus, Event, EventError, EventHandler,
    Framework, Invoice, InvoiceStatus, OwnerError, Plan, Severity, SupportTicket, Tenant, TenantStatus, User,
    UserRole, Variant, Webhook, WebhookDelivery, into_record,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl EventHandler for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Writes a model with its own `created_at`, which the typed repository resets.
async fn backdated<T: serde::Serialize>(h: &common::Harness, collection: Collection, model: &T, days: i64) {
    let mut value = serde_json::to_value(model).unwrap();
    let at = Utc::now() - Duration::days(days);
    value["created_at"] = json!(at);
    value["updated_at"] = json!(at);
    h.records().create(collection, into_record(value).unwrap()).await.unwrap();
}

// ==================== Compliance ====================

#[tokio::test]
async fn test_compliance_report_scores_findings() {
    let h = harness().await;
    let tenant = h.tenant("maple", Plan::Pro).await;
    let records = h.records();

    records
        .repo::<Webhook>()
        .create(&Webhook::new("http://hooks.maple.edu/in", "0123456789abcdef0123").for_tenant(&tenant.id))
        .await
        .unwrap();
    h.admin.api_keys().issue(&tenant.id, "Forever key", vec![], None).await.unwrap();
    let stale = ApiKey {
        id: "key-stale".to_string(),
        tenant_id: tenant.id.clone(),
        name: "Old key".to_string(),
        prefix: "ok_live_old0".to_string(),
        key_hash: "deadbeef".to_string(),
        expires_at: Some(Utc::now() + Duration::days(365)),
        ..Default::default()
    };
    backdated(&h, Collection::ApiKeys, &stale, 120).await;
    let mut admin = User::new(&tenant.id, "head@maple.edu", UserRole::Admin);
    admin.last_login_at = None;
    backdated(&h, Collection::Users, &admin, 200).await;
    h.admin.domains().start_verification(&tenant.id, "learn.maple.edu").await.unwrap();
    h.admin
        .incidents()
        .open(NewIncident {
            title: "Data center fire".to_string(),
            severity: Severity::Critical,
            affected_tenants: vec![tenant.id.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    let report = h
        .admin
        .compliance()
        .generate(&tenant.id, Framework::Ferpa, "owner")
        .await
        .unwrap();
    let mut codes: Vec<&str> = report.findings.iter().map(|f| f.code.as_str()).collect();
    codes.sort();
    assert_eq!(
        codes,
        vec![
            "API_KEY_NO_EXPIRY",
            "API_KEY_STALE",
            "AUDIT_LOG_GAP",
            "DOMAIN_UNVERIFIED",
            "INACTIVE_ADMIN",
            "OPEN_CRITICAL_INCIDENT",
            "WEBHOOK_INSECURE_URL",
        ]
    );
    assert_eq!(report.score, 100 - (15 + 8 + 3 + 8 + 3 + 3 + 25));
    assert_eq!(report.status, ComplianceStatus::NonCompliant);
    assert_eq!(report.generated_by, "owner");

    let compliance = h.admin.compliance();
    let resolved = compliance
        .resolve_finding(&report.id, "OPEN_CRITICAL_INCIDENT")
        .await
        .unwrap();
    assert_eq!(resolved.score, 60);
    assert_eq!(resolved.status, ComplianceStatus::NonCompliant);
    let resolved = compliance
        .resolve_finding(&report.id, "WEBHOOK_INSECURE_URL")
        .await
        .unwrap();
    assert_eq!(resolved.score, 75);
    assert_eq!(resolved.status, ComplianceStatus::NeedsAttention);
    assert_eq!(resolved.findings.iter().filter(|f| f.resolved).count(), 2);

    let err = h
        .admin
        .compliance()
        .resolve_finding(&report.id, "NOT_A_CHECK")
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::NotFound { .. }));
}

#[tokio::test]
async fn test_clean_tenant_is_compliant() {
    let h = harness().await;
    let tenant = h.tenant("maple", Plan::Basic).await;
    let mut entry = AuditLog::new("owner", "settings.reviewed", "tenants", &tenant.id);
    entry.tenant_id = Some(tenant.id.clone());
    h.admin.audit().record(entry).await.unwrap();

    let report = h
        .admin
        .compliance()
        .generate(&tenant.id, Framework::Gdpr, "owner")
        .await
        .unwrap();
    assert!(report.findings.is_empty());
    assert_eq!(report.score, 100);
    assert_eq!(report.status, ComplianceStatus::Compliant);
}

// ==================== Churn ====================

#[tokio::test]
async fn test_churn_scores_and_ranks_tenants() {
    let h = harness().await;
    let records = h.records();

    let healthy = h.active_tenant("healthy", Plan::Enterprise).await;
    h.admin.tenants().touch_activity(&healthy.id).await.unwrap();

    let risky = h.active_tenant("risky", Plan::Basic).await;
    for n in 0..2 {
        records
            .repo::<Invoice>()
            .create(&Invoice {
                tenant_id: risky.id.clone(),
                number: format!("INV-OLD-{n}"),
                amount_cents: 4900,
                currency: "usd".to_string(),
                status: InvoiceStatus::Overdue,
                due_date: Utc::now() - Duration::days(20),
                ..Default::default()
            })
            .await
            .unwrap();
    }
    for subject in ["Cannot log in", "Grades missing", "Slow pages"] {
        h.admin
            .support()
            .create(&SupportTicket::new(&risky.id, subject, "", "t@risky.edu"))
            .await
            .unwrap();
    }

    let trial = h.tenant("trial", Plan::Enterprise).await;
    let gone = h.tenant("gone", Plan::Basic).await;
    h.admin.tenants().cancel(&gone.id).await.unwrap();

    let score = h.admin.churn().score(&healthy.id).await.unwrap();
    assert_eq!(score.score, 0);
    assert_eq!(score.level, RiskLevel::Low);

    let score = h.admin.churn().score(&risky.id).await.unwrap();
    assert_eq!(score.score, 30 + 35 + 15 + 15);
    assert_eq!(score.level, RiskLevel::High);
    let codes: Vec<&str> = score.factors.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(codes, vec!["inactive", "overdue_invoices", "open_tickets", "low_utilization"]);

    let at_risk = h.admin.churn().at_risk(RiskLevel::Medium).await.unwrap();
    let ids: Vec<&str> = at_risk.iter().map(|r| r.tenant_id.as_str()).collect();
    assert_eq!(ids, vec![risky.id.as_str(), trial.id.as_str()]);
    assert_eq!(at_risk[0].score, score.score);

    let high = h.admin.churn().at_risk(RiskLevel::High).await.unwrap();
    assert_eq!(high.len(), 1);
}

// ==================== Cloning ====================

#[tokio::test]
async fn test_clone_copies_selected_data() {
    let h = harness().await;
    let recorder = Recorder::default();
    h.bus.on("tenant.cloned", recorder.clone()).await;

    let source = h
        .admin
        .tenants()
        .create(json!({
            "name": "Maple High",
            "slug": "maple",
            "owner_email": "head@maple.edu",
            "plan": "pro",
            "max_students": 900,
            "settings": { "theme": "green" },
        }))
        .await
        .unwrap();
    let records = h.records();
    let mut teacher = User::new(&source.id, "t@maple.edu", UserRole::Teacher);
    teacher.last_login_at = Some(Utc::now());
    records.repo::<User>().create(&teacher).await.unwrap();
    records
        .repo::<User>()
        .create(&User::new(&source.id, "a@maple.edu", UserRole::Admin))
        .await
        .unwrap();
    let hook = records
        .repo::<Webhook>()
        .create(
            &Webhook::new("https://hooks.maple.edu/in", "0123456789abcdef0123")
                .for_tenant(&source.id)
                .events(["tenant.*"]),
        )
        .await
        .unwrap();

    let summary = h
        .admin
        .cloning()
        .clone_tenant(&source.id, CloneOptions::new("Maple Sandbox", "maple-sandbox"), "owner")
        .await
        .unwrap();
    let clone = &summary.tenant;
    assert_eq!(summary.users_copied, 2);
    assert_eq!(summary.webhooks_copied, 1);
    assert_eq!(clone.status, TenantStatus::Trial);
    assert_eq!(clone.plan, Plan::Pro);
    assert_eq!(clone.max_students, 900);
    assert_eq!(clone.cloned_from.as_deref(), Some(source.id.as_str()));
    assert_eq!(clone.settings.get("theme"), Some(&json!("green")));

    let scope = format!("tenant_id = '{}'", clone.id);
    let users = records.repo::<User>().full_list(Some(&scope)).await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.last_login_at.is_none()));

    let webhooks = records.repo::<Webhook>().full_list(Some(&scope)).await.unwrap();
    assert_eq!(webhooks.len(), 1);
    assert!(!webhooks[0].active);
    assert_ne!(webhooks[0].secret, hook.secret);
    assert_ne!(webhooks[0].id, hook.id);
    assert_eq!(webhooks[0].events, vec!["tenant.*"]);

    let trail = h.admin.audit().for_resource("tenants", &clone.id).await.unwrap();
    assert_eq!(trail[0].action, "tenant.cloned");
    assert_eq!(trail[0].details["source_tenant_id"], json!(source.id));

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tenant_id.as_deref(), Some(clone.id.as_str()));
}

#[tokio::test]
async fn test_clone_options_can_skip_data() {
    let h = harness().await;
    let source = h.tenant("maple", Plan::Basic).await;
    h.records()
        .repo::<User>()
        .create(&User::new(&source.id, "t@maple.edu", UserRole::Teacher))
        .await
        .unwrap();

    let options = CloneOptions {
        include_users: false,
        include_webhooks: false,
        include_settings: false,
        ..CloneOptions::new("Maple Copy", "maple-copy")
    };
    let summary = h.admin.cloning().clone_tenant(&source.id, options, "owner").await.unwrap();
    assert_eq!(summary.users_copied, 0);
    assert!(summary.tenant.settings.is_empty());

    let err = h
        .admin
        .cloning()
        .clone_tenant(&source.id, CloneOptions::new("Maple Copy", "maple-copy"), "owner")
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::DuplicateEntry { .. }));

    let err = h
        .admin
        .cloning()
        .clone_tenant(&source.id, CloneOptions::new("X", "Bad Slug"), "owner")
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::Validation { .. }));
}

// ==================== Domains ====================

#[tokio::test]
async fn test_domain_verification() {
    let h = harness().await;
    let domains = h.admin.domains();
    let tenant = h.tenant("maple", Plan::Pro).await;

    let err = domains.verify(&tenant.id).await.unwrap_err();
    assert!(matches!(err, OwnerError::Conflict { .. }));

    let instructions = domains.start_verification(&tenant.id, "Learn.Maple.EDU").await.unwrap();
    assert_eq!(instructions.domain, "learn.maple.edu");
    assert_eq!(instructions.record_type, "TXT");
    assert_eq!(instructions.host, "_owner-verification.learn.maple.edu");
    assert!(instructions.value.starts_with("owner-verify="));
    assert_eq!(instructions.value.len(), "owner-verify=".len() + 32);

    let pending = domains.verify(&tenant.id).await.unwrap();
    assert!(!pending.verified);
    assert!(!pending.tenant.domain_verified);

    h.dns.publish(&instructions.host, "v=spf1 -all");
    h.dns.publish(&instructions.host, &instructions.value);
    let verified = domains.verify(&tenant.id).await.unwrap();
    assert!(verified.verified);
    assert_eq!(verified.records.len(), 2);
    assert!(verified.tenant.domain_verified);
    assert!(verified.tenant.domain_verified_at.is_some());

    let again = domains.verify(&tenant.id).await.unwrap();
    assert!(again.verified);
    assert!(again.records.is_empty());
}

#[tokio::test]
async fn test_domain_rules() {
    let h = harness().await;
    let domains = h.admin.domains();
    let maple = h.tenant("maple", Plan::Pro).await;
    let oak = h.tenant("oak", Plan::Pro).await;

    let err = domains.start_verification(&maple.id, "localhost").await.unwrap_err();
    assert!(matches!(err, OwnerError::InvalidField { .. }));

    domains.start_verification(&maple.id, "learn.maple.edu").await.unwrap();
    let err = domains.start_verification(&oak.id, "learn.maple.edu").await.unwrap_err();
    assert!(matches!(err, OwnerError::DuplicateEntry { .. }));

    let first = h.records().repo::<Tenant>().require(&maple.id).await.unwrap();
    domains.start_verification(&maple.id, "learn.maple.edu").await.unwrap();
    let second = h.records().repo::<Tenant>().require(&maple.id).await.unwrap();
    assert_ne!(first.domain_verification_token, second.domain_verification_token);
}

// ==================== Dashboard ====================

#[tokio::test]
async fn test_dashboard_summary() {
    let h = harness().await;
    let prices = h.admin.config().prices;

    let pro = h.active_tenant("maple", Plan::Pro).await;
    h.tenant("oak", Plan::Basic).await;
    let gone = h.tenant("pine", Plan::Basic).await;
    h.admin.tenants().cancel(&gone.id).await.unwrap();

    h.admin
        .support()
        .create(&SupportTicket::new(&pro.id, "Need help", "", "t@maple.edu"))
        .await
        .unwrap();
    h.admin
        .incidents()
        .open(NewIncident {
            title: "Slow reports".to_string(),
            severity: Severity::Medium,
            ..Default::default()
        })
        .await
        .unwrap();
    let test = h
        .admin
        .ab_tests()
        .create("Pricing page", vec![Variant::new("a", 1), Variant::new("b", 1)])
        .await
        .unwrap();
    h.admin.ab_tests().start(&test.id).await.unwrap();
    for status in [DeliveryStatus::Failed, DeliveryStatus::Success] {
        h.records()
            .repo::<WebhookDelivery>()
            .create(&WebhookDelivery {
                webhook_id: "wh-1".to_string(),
                event: "tenant.updated".to_string(),
                status,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let summary = h.admin.dashboard().summary().await.unwrap();
    assert_eq!(summary.total_tenants, 3);
    assert_eq!(summary.tenants_by_status["active"], 1);
    assert_eq!(summary.tenants_by_status["trial"], 1);
    assert_eq!(summary.tenants_by_status["cancelled"], 1);
    assert_eq!(summary.tenants_by_status["suspended"], 0);
    assert_eq!(summary.mrr_cents, prices.pro);
    assert_eq!(summary.open_tickets, 1);
    assert_eq!(summary.active_incidents, 1);
    assert_eq!(summary.running_tests, 1);
    assert_eq!(summary.failed_deliveries_24h, 1);
    assert_eq!(test.status, AbTestStatus::Draft);
}
