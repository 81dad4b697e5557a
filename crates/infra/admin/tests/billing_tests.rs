mod common;

use chrono::{Duration, Utc};
use common::harness;
use owner_admin::{BillingPeriod, PlanPrices};
use owner_core::{Invoice, InvoiceStatus, OwnerError, Plan, Tenant, TenantStatus};

#[tokio::test]
async fn test_issue_invoice_uses_plan_price() {
    let h = harness().await;
    let tenant = h.active_tenant("maple", Plan::Pro).await;
    let period = BillingPeriod::current();

    let invoice = h.admin.billing().issue_invoice(&tenant.id, period).await.unwrap();
    assert_eq!(invoice.amount_cents, PlanPrices::default().pro);
    assert_eq!(invoice.currency, "usd");
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.period_start, Some(period.start));
    assert!(invoice.number.starts_with(&format!("INV-{}", period.start.format("%Y%m"))));
    assert!(invoice.due_date > Utc::now() + Duration::days(13));

    h.admin.tenants().cancel(&tenant.id).await.unwrap();
    let err = h.admin.billing().issue_invoice(&tenant.id, period).await.unwrap_err();
    assert!(matches!(err, OwnerError::Conflict { .. }));
}

#[tokio::test]
async fn test_settle_invoices() {
    let h = harness().await;
    let billing = h.admin.billing();
    let tenant = h.active_tenant("maple", Plan::Basic).await;

    let invoice = billing.issue_invoice(&tenant.id, BillingPeriod::current()).await.unwrap();
    let paid = billing.mark_paid(&invoice.id).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(paid.paid_at.is_some());

    let err = billing.void(&invoice.id).await.unwrap_err();
    assert!(matches!(err, OwnerError::InvalidTransition { .. }));

    let other = billing.issue_invoice(&tenant.id, BillingPeriod::current()).await.unwrap();
    let voided = billing.void(&other.id).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Void);
    assert!(voided.paid_at.is_none());
    assert!(billing.mark_paid(&other.id).await.is_err());
}

#[tokio::test]
async fn test_mark_overdue_only_touches_past_due_pending() {
    let h = harness().await;
    let billing = h.admin.billing();
    let tenant = h.active_tenant("maple", Plan::Basic).await;
    let invoices = h.records().repo::<Invoice>();

    let current = billing.issue_invoice(&tenant.id, BillingPeriod::current()).await.unwrap();
    let late = invoices
        .create(&Invoice {
            tenant_id: tenant.id.clone(),
            number: "INV-LATE-1".to_string(),
            amount_cents: 4900,
            currency: "usd".to_string(),
            status: InvoiceStatus::Pending,
            due_date: Utc::now() - Duration::days(3),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(billing.mark_overdue().await.unwrap(), 1);
    assert_eq!(invoices.require(&late.id).await.unwrap().status, InvoiceStatus::Overdue);
    assert_eq!(invoices.require(&current.id).await.unwrap().status, InvoiceStatus::Pending);
    assert_eq!(billing.mark_overdue().await.unwrap(), 0);

    let paid = billing.mark_paid(&late.id).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_stats() {
    let h = harness().await;
    let billing = h.admin.billing();
    let prices = PlanPrices::default();

    let pro = h.active_tenant("maple", Plan::Pro).await;
    let basic = h.active_tenant("oak", Plan::Basic).await;
    h.active_tenant("pine", Plan::Free).await;
    h.tenant("birch", Plan::Enterprise).await;

    let paid = billing.issue_invoice(&pro.id, BillingPeriod::current()).await.unwrap();
    billing.mark_paid(&paid.id).await.unwrap();
    billing.issue_invoice(&basic.id, BillingPeriod::current()).await.unwrap();

    let stats = billing.stats().await.unwrap();
    assert_eq!(stats.total_revenue_cents, prices.pro);
    assert_eq!(stats.outstanding_cents, prices.basic);
    assert_eq!(stats.invoices_by_status.get("paid"), Some(&1));
    assert_eq!(stats.invoices_by_status.get("pending"), Some(&1));
    assert_eq!(stats.overdue_count, 0);
    assert_eq!(stats.mrr_cents, prices.pro + prices.basic);
    assert_eq!(stats.paying_tenants, 2);
    assert_eq!(stats.arpu_cents, (prices.pro + prices.basic) / 2);
}

#[tokio::test]
async fn test_projection_buckets_paid_revenue() {
    let h = harness().await;
    let billing = h.admin.billing();
    let tenant = h.active_tenant("maple", Plan::Basic).await;

    let invoice = billing.issue_invoice(&tenant.id, BillingPeriod::current()).await.unwrap();
    billing.mark_paid(&invoice.id).await.unwrap();

    let projection = billing.projection(3, 2).await.unwrap();
    assert_eq!(projection.history.len(), 3);
    assert_eq!(projection.projected.len(), 2);
    let this_month = Utc::now().format("%Y-%m").to_string();
    assert_eq!(projection.history[2].month, this_month);
    assert_eq!(projection.history[2].revenue_cents, invoice.amount_cents);
    assert_eq!(projection.history[0].revenue_cents, 0);
    assert!(projection.slope_cents_per_month > 0.0);

    let clamped = billing.projection(0, 500).await.unwrap();
    assert_eq!(clamped.history.len(), 1);
    assert_eq!(clamped.projected.len(), 60);
}

#[tokio::test]
async fn test_checkout_flow() {
    let h = harness().await;
    let billing = h.admin.billing();
    let tenant = h.tenant("maple", Plan::Free).await;

    let session = billing.create_checkout(&tenant.id, Plan::Pro).await.unwrap();
    assert_eq!(session.session_id, "cs_test_1");
    {
        let requests = h.payments.requests.lock().unwrap();
        assert_eq!(requests[0].amount_cents, PlanPrices::default().pro);
        assert_eq!(requests[0].customer_email, "admin@maple.edu");
        assert_eq!(requests[0].plan, Plan::Pro);
    }

    let completion = billing
        .complete_checkout(&session.session_id, &tenant.id, Plan::Pro)
        .await
        .unwrap();
    assert_eq!(completion.tenant.status, TenantStatus::Active);
    assert_eq!(completion.tenant.plan, Plan::Pro);
    assert_eq!(completion.tenant.max_students, 2_500);
    assert!(completion.tenant.trial_ends_at.is_none());
    assert_eq!(completion.invoice.status, InvoiceStatus::Paid);
    assert_eq!(completion.invoice.checkout_session_id.as_deref(), Some("cs_test_1"));

    let err = billing
        .complete_checkout(&session.session_id, &tenant.id, Plan::Pro)
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::Conflict { .. }));
    assert!(billing.complete_checkout(" ", &tenant.id, Plan::Pro).await.is_err());
}

#[tokio::test]
async fn test_repeated_session_leaves_tenant_untouched() {
    let h = harness().await;
    let billing = h.admin.billing();
    let first = h.tenant("maple", Plan::Free).await;
    let second = h.tenant("birch", Plan::Free).await;

    billing.complete_checkout("cs_shared", &first.id, Plan::Basic).await.unwrap();
    let err = billing
        .complete_checkout("cs_shared", &second.id, Plan::Enterprise)
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::Conflict { .. }));

    let second = h.records().repo::<Tenant>().require(&second.id).await.unwrap();
    assert_eq!(second.plan, Plan::Free);
    assert_ne!(second.status, TenantStatus::Active);

    let paid = h
        .records()
        .repo::<Invoice>()
        .full_list(Some("checkout_session_id = 'cs_shared'"))
        .await
        .unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].tenant_id, first.id);
}

#[tokio::test]
async fn test_session_id_is_unique_across_invoices() {
    let h = harness().await;
    let tenant = h.active_tenant("maple", Plan::Pro).await;
    let invoices = h.records().repo::<Invoice>();
    let invoice = |number: &str| Invoice {
        tenant_id: tenant.id.clone(),
        number: number.to_string(),
        amount_cents: 14_900,
        currency: "usd".to_string(),
        status: InvoiceStatus::Paid,
        due_date: Utc::now(),
        checkout_session_id: Some("cs_race".to_string()),
        ..Default::default()
    };

    invoices.create(&invoice("INV-RACE-1")).await.unwrap();
    let err = invoices.create(&invoice("INV-RACE-2")).await.unwrap_err();
    assert!(matches!(err, OwnerError::DuplicateEntry { ref field, .. } if field == "checkout_session_id"));

    // Invoices without a session never collide.
    for number in ["INV-MANUAL-1", "INV-MANUAL-2"] {
        let manual = Invoice {
            checkout_session_id: None,
            ..invoice(number)
        };
        invoices.create(&manual).await.unwrap();
    }
}

#[tokio::test]
async fn test_checkout_rejections() {
    let h = harness().await;
    let billing = h.admin.billing();
    let tenant = h.tenant("maple", Plan::Free).await;

    let err = billing.create_checkout(&tenant.id, Plan::Free).await.unwrap_err();
    assert!(matches!(err, OwnerError::InvalidField { .. }));

    *h.payments.fail_with.lock().unwrap() = Some(402);
    let err = billing.create_checkout(&tenant.id, Plan::Basic).await.unwrap_err();
    assert!(matches!(err, OwnerError::Upstream { status: 402, .. }));
    assert!(!err.is_retryable());

    *h.payments.fail_with.lock().unwrap() = None;
    h.admin.tenants().cancel(&tenant.id).await.unwrap();
    let err = billing.create_checkout(&tenant.id, Plan::Basic).await.unwrap_err();
    assert!(matches!(err, OwnerError::Conflict { .. }));
    assert!(h.payments.requests.lock().unwrap().is_empty());
}
