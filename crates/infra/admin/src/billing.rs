//! Billing: plan prices, invoices, revenue figures and checkout.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use owner_core::{
    Invoice, InvoiceStatus, OwnerError, OwnerResult, Plan, RecordService, Tenant, TenantStatus, quote,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "http-client")]
use owner_core::{RetryConfig, retry_async};

/// Days between issuing an invoice and its due date.
pub const INVOICE_DUE_DAYS: i64 = 14;

/// Monthly price of each plan, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanPrices {
    pub free: i64,
    pub basic: i64,
    pub pro: i64,
    pub enterprise: i64,
}

impl Default for PlanPrices {
    fn default() -> Self {
        Self {
            free: 0,
            basic: 4_900,
            pro: 14_900,
            enterprise: 49_900,
        }
    }
}

impl PlanPrices {
    pub fn price(&self, plan: Plan) -> i64 {
        match plan {
            Plan::Free => self.free,
            Plan::Basic => self.basic,
            Plan::Pro => self.pro,
            Plan::Enterprise => self.enterprise,
        }
    }
}

/// Sum of plan prices over active tenants.
pub fn monthly_recurring_revenue(tenants: &[Tenant], prices: &PlanPrices) -> i64 {
    tenants
        .iter()
        .filter(|t| t.status == TenantStatus::Active)
        .map(|t| prices.price(t.plan))
        .sum()
}

/// Invoice and revenue figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingStats {
    /// Sum of paid invoices.
    pub total_revenue_cents: i64,
    /// Sum of pending and overdue invoices.
    pub outstanding_cents: i64,
    pub invoices_by_status: BTreeMap<String, usize>,
    pub overdue_count: usize,
    pub mrr_cents: i64,
    /// MRR per active paying tenant.
    pub arpu_cents: i64,
    pub paying_tenants: usize,
}

/// Revenue of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`.
    pub month: String,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueProjection {
    pub history: Vec<MonthlyRevenue>,
    pub projected: Vec<MonthlyRevenue>,
    pub slope_cents_per_month: f64,
}

/// Fits `y = a + b·x` over `history` and extends it `forward` steps,
/// clamped at zero. With fewer than two points the last value is repeated.
pub fn project_revenue(history: &[i64], forward: usize) -> (Vec<i64>, f64) {
    let n = history.len();
    if n < 2 {
        let last = history.last().copied().unwrap_or(0).max(0);
        return (vec![last; forward], 0.0);
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = history.iter().sum::<i64>() as f64 / n_f;
    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in history.iter().enumerate() {
        let dx = x as f64 - mean_x;
        num += dx * (*y as f64 - mean_y);
        den += dx * dx;
    }
    let slope = num / den;
    let intercept = mean_y - slope * mean_x;

    let projected = (n..n + forward)
        .map(|x| (intercept + slope * x as f64).round().max(0.0) as i64)
        .collect();
    (projected, slope)
}

/// Months since year 0; lets calendar months be added and compared.
fn month_index(date: DateTime<Utc>) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn month_label(index: i32) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

fn month_start(index: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// The period an invoice covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// The calendar month containing `date`.
    pub fn month_of(date: DateTime<Utc>) -> Self {
        let index = month_index(date);
        Self {
            start: month_start(index),
            end: month_start(index + 1),
        }
    }

    pub fn current() -> Self {
        Self::month_of(Utc::now())
    }
}

/// `INV-YYYYMM-XXXXXX`.
fn invoice_number(period: &BillingPeriod) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("INV-{}-{:06X}", period.start.format("%Y%m"), suffix)
}

// ==================== Payment provider ====================

/// What the customer is asked to pay for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub tenant_id: String,
    pub plan: Plan,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
}

/// A hosted checkout page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Creates hosted checkout sessions.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> OwnerResult<CheckoutSession>;
}

/// Stripe API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_base: "https://api.stripe.com".to_string(),
            success_url: "https://owner.example.com/billing/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "https://owner.example.com/billing/cancel".to_string(),
        }
    }
}

/// Stripe Checkout over its form-encoded REST API.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone)]
pub struct StripeProvider {
    client: reqwest::Client,
    config: StripeConfig,
    retry: RetryConfig,
}

#[cfg(feature = "http-client")]
impl StripeProvider {
    pub fn new(config: StripeConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: StripeConfig) -> Self {
        Self {
            client,
            config,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Form fields of a subscription checkout session.
    pub fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let item = "line_items[0]";
        vec![
            ("mode".into(), "subscription".into()),
            ("success_url".into(), self.config.success_url.clone()),
            ("cancel_url".into(), self.config.cancel_url.clone()),
            ("client_reference_id".into(), request.tenant_id.clone()),
            ("customer_email".into(), request.customer_email.clone()),
            (format!("{item}[quantity]"), "1".into()),
            (format!("{item}[price_data][currency]"), request.currency.clone()),
            (format!("{item}[price_data][unit_amount]"), request.amount_cents.to_string()),
            (format!("{item}[price_data][recurring][interval]"), "month".into()),
            (
                format!("{item}[price_data][product_data][name]"),
                format!("Owner Console {} plan", request.plan),
            ),
            ("metadata[tenant_id]".into(), request.tenant_id.clone()),
            ("metadata[plan]".into(), request.plan.to_string()),
        ]
    }

    /// The session request. Retries reuse `idempotency_key`, so Stripe
    /// answers a repeated POST with the session it already created.
    pub fn session_request(
        &self,
        url: &str,
        form: &[(String, String)],
        idempotency_key: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
    }

    async fn post_session(
        &self,
        url: &str,
        form: &[(String, String)],
        idempotency_key: &str,
    ) -> OwnerResult<CheckoutSession> {
        #[derive(Deserialize)]
        struct Session {
            id: String,
            url: Option<String>,
        }

        let response = self
            .session_request(url, form, idempotency_key)
            .send()
            .await
            .map_err(crate::http::request_error)?;
        let session: Session = crate::http::check_status("stripe", response)
            .await?
            .json()
            .await
            .map_err(crate::http::request_error)?;

        let url = session
            .url
            .ok_or_else(|| OwnerError::upstream("stripe", 200, "checkout session has no url"))?;
        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> OwnerResult<CheckoutSession> {
        if self.config.secret_key.is_empty() {
            return Err(OwnerError::config("billing.stripe_secret_key is not set"));
        }

        let url = format!("{}/v1/checkout/sessions", self.config.api_base.trim_end_matches('/'));
        let form = self.checkout_form(request);
        let key = idempotency_key(request);
        retry_async(&self.retry, || self.post_session(&url, &form, &key)).await
    }
}

/// A fresh key for one checkout attempt, shared by all of its retries.
pub fn idempotency_key(request: &CheckoutRequest) -> String {
    let nonce: [u8; 12] = rand::thread_rng().r#gen();
    format!("checkout-{}-{}-{}", request.tenant_id, request.plan, hex::encode(nonce))
}

// ==================== Service ====================

/// Outcome of a completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutCompletion {
    pub tenant: Tenant,
    pub invoice: Invoice,
}

/// Invoices, revenue and plan checkout.
#[derive(Clone)]
pub struct BillingService {
    records: RecordService,
    provider: Arc<dyn PaymentProvider>,
    prices: PlanPrices,
    currency: String,
}

impl BillingService {
    pub fn new(
        records: RecordService,
        provider: Arc<dyn PaymentProvider>,
        prices: PlanPrices,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            records,
            provider,
            prices,
            currency: currency.into(),
        }
    }

    pub fn prices(&self) -> &PlanPrices {
        &self.prices
    }

    pub async fn stats(&self) -> OwnerResult<BillingStats> {
        let invoices = self.records.repo::<Invoice>().full_list(None).await?;
        let tenants = self.records.repo::<Tenant>().full_list(None).await?;

        let mut by_status = BTreeMap::new();
        let (mut revenue, mut outstanding) = (0, 0);
        for invoice in &invoices {
            *by_status.entry(invoice.status.to_string()).or_insert(0) += 1;
            if invoice.status == InvoiceStatus::Paid {
                revenue += invoice.amount_cents;
            } else if invoice.status.is_outstanding() {
                outstanding += invoice.amount_cents;
            }
        }

        let mrr = monthly_recurring_revenue(&tenants, &self.prices);
        let paying = tenants
            .iter()
            .filter(|t| t.status == TenantStatus::Active && self.prices.price(t.plan) > 0)
            .count();
        let arpu = if paying == 0 {
            0
        } else {
            (mrr as f64 / paying as f64).round() as i64
        };

        Ok(BillingStats {
            total_revenue_cents: revenue,
            outstanding_cents: outstanding,
            overdue_count: by_status.get(InvoiceStatus::Overdue.as_str()).copied().unwrap_or(0),
            invoices_by_status: by_status,
            mrr_cents: mrr,
            arpu_cents: arpu,
            paying_tenants: paying,
        })
    }

    /// Paid revenue per month for the trailing `history_months` (current
    /// month included) and a linear projection `forward_months` ahead.
    pub async fn projection(&self, history_months: usize, forward_months: usize) -> OwnerResult<RevenueProjection> {
        let history_months = history_months.clamp(1, 120);
        let forward_months = forward_months.min(60);

        let current = month_index(Utc::now());
        let first = current - (history_months as i32 - 1);
        let mut totals = vec![0_i64; history_months];

        let filter = format!("status = {}", quote(InvoiceStatus::Paid.as_str()));
        for invoice in self.records.repo::<Invoice>().full_list(Some(&filter)).await? {
            let Some(paid_at) = invoice.paid_at else { continue };
            let index = month_index(paid_at);
            if (first..=current).contains(&index) {
                totals[(index - first) as usize] += invoice.amount_cents;
            }
        }

        let (projected, slope) = project_revenue(&totals, forward_months);
        Ok(RevenueProjection {
            history: totals
                .iter()
                .enumerate()
                .map(|(i, cents)| MonthlyRevenue {
                    month: month_label(first + i as i32),
                    revenue_cents: *cents,
                })
                .collect(),
            projected: projected
                .into_iter()
                .enumerate()
                .map(|(i, cents)| MonthlyRevenue {
                    month: month_label(current + 1 + i as i32),
                    revenue_cents: cents,
                })
                .collect(),
            slope_cents_per_month: slope,
        })
    }

    /// Issues a pending invoice for the tenant's plan price.
    pub async fn issue_invoice(&self, tenant_id: &str, period: BillingPeriod) -> OwnerResult<Invoice> {
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        if tenant.status == TenantStatus::Cancelled {
            return Err(OwnerError::conflict("cannot invoice a cancelled tenant"));
        }

        let invoice = Invoice {
            tenant_id: tenant.id.clone(),
            number: invoice_number(&period),
            amount_cents: self.prices.price(tenant.plan),
            currency: self.currency.clone(),
            status: InvoiceStatus::Pending,
            period_start: Some(period.start),
            period_end: Some(period.end),
            due_date: Utc::now() + Duration::days(INVOICE_DUE_DAYS),
            ..Default::default()
        };
        let invoice = self.records.repo::<Invoice>().create(&invoice).await?;
        tracing::info!(tenant = %tenant.id, invoice = %invoice.number, amount = invoice.amount_cents, "invoice issued");
        Ok(invoice)
    }

    /// Moves pending invoices past their due date to overdue.
    pub async fn mark_overdue(&self) -> OwnerResult<usize> {
        let filter = format!(
            "status = {} && due_date < {}",
            quote(InvoiceStatus::Pending.as_str()),
            quote(&Utc::now().to_rfc3339())
        );
        let invoices = self.records.repo::<Invoice>();
        let due = invoices.full_list(Some(&filter)).await?;
        for invoice in &due {
            invoices
                .patch(&invoice.id, json!({ "status": InvoiceStatus::Overdue }))
                .await?;
        }

        if !due.is_empty() {
            tracing::info!(count = due.len(), "invoices marked overdue");
        }
        Ok(due.len())
    }

    pub async fn mark_paid(&self, invoice_id: &str) -> OwnerResult<Invoice> {
        self.settle(invoice_id, InvoiceStatus::Paid).await
    }

    pub async fn void(&self, invoice_id: &str) -> OwnerResult<Invoice> {
        self.settle(invoice_id, InvoiceStatus::Void).await
    }

    async fn settle(&self, invoice_id: &str, to: InvoiceStatus) -> OwnerResult<Invoice> {
        let invoices = self.records.repo::<Invoice>();
        let invoice = invoices.require(invoice_id).await?;
        if !matches!(
            invoice.status,
            InvoiceStatus::Draft | InvoiceStatus::Pending | InvoiceStatus::Overdue
        ) {
            return Err(OwnerError::transition("invoice", invoice.status, to));
        }

        let mut patch = json!({ "status": to });
        if to == InvoiceStatus::Paid {
            patch["paid_at"] = json!(Utc::now());
        }
        invoices.patch(invoice_id, patch).await
    }

    /// Starts a hosted checkout for moving the tenant to a paid plan.
    pub async fn create_checkout(&self, tenant_id: &str, plan: Plan) -> OwnerResult<CheckoutSession> {
        if plan == Plan::Free {
            return Err(OwnerError::invalid_field("plan", "the free plan needs no checkout"));
        }
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        if tenant.status == TenantStatus::Cancelled {
            return Err(OwnerError::conflict("cannot check out for a cancelled tenant"));
        }

        let request = CheckoutRequest {
            tenant_id: tenant.id.clone(),
            plan,
            amount_cents: self.prices.price(plan),
            currency: self.currency.clone(),
            customer_email: tenant.owner_email.clone(),
        };
        let session = self.provider.create_checkout_session(&request).await?;
        tracing::info!(tenant = %tenant.id, plan = %plan, session = %session.session_id, "checkout started");
        Ok(session)
    }

    /// Applies a paid checkout: records the payment, then switches the
    /// plan and activates the tenant.
    ///
    /// The invoice is written first. Its unique `checkout_session_id` makes
    /// a repeated or concurrent completion fail before the tenant changes.
    pub async fn complete_checkout(
        &self,
        session_id: &str,
        tenant_id: &str,
        plan: Plan,
    ) -> OwnerResult<CheckoutCompletion> {
        if session_id.trim().is_empty() {
            return Err(OwnerError::MissingField {
                field: "session_id".to_string(),
            });
        }
        let already_completed =
            || OwnerError::conflict(format!("checkout session {} was already completed", session_id));
        let invoices = self.records.repo::<Invoice>();
        let seen = format!("checkout_session_id = {}", quote(session_id));
        if invoices.first(&seen).await?.is_some() {
            return Err(already_completed());
        }

        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        let now = Utc::now();
        let period = BillingPeriod::month_of(now);
        let invoice = Invoice {
            tenant_id: tenant.id.clone(),
            number: invoice_number(&period),
            amount_cents: self.prices.price(plan),
            currency: self.currency.clone(),
            status: InvoiceStatus::Paid,
            period_start: Some(period.start),
            period_end: Some(period.end),
            due_date: now,
            paid_at: Some(now),
            checkout_session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        let invoice = invoices.create(&invoice).await.map_err(|e| match e {
            OwnerError::DuplicateEntry { ref field, .. } if field == "checkout_session_id" => already_completed(),
            other => other,
        })?;

        let tenant = self
            .records
            .repo::<Tenant>()
            .patch(
                &tenant.id,
                json!({
                    "plan": plan,
                    "max_students": plan.default_max_students(),
                    "status": TenantStatus::Active,
                    "trial_ends_at": null,
                }),
            )
            .await?;
        tracing::info!(tenant = %tenant.id, plan = %plan, session = %session_id, "checkout completed");
        Ok(CheckoutCompletion { tenant, invoice })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_fits_a_line() {
        let (projected, slope) = project_revenue(&[100, 200, 300], 2);
        assert_eq!(projected, vec![400, 500]);
        assert!((slope - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_projection_clamps_at_zero() {
        let (projected, _) = project_revenue(&[300, 100], 3);
        assert_eq!(projected, vec![0, 0, 0]);
    }

    #[test]
    fn test_projection_is_flat_without_history() {
        assert_eq!(project_revenue(&[700], 3), (vec![700, 700, 700], 0.0));
        assert_eq!(project_revenue(&[], 2), (vec![0, 0], 0.0));
    }

    #[test]
    fn test_billing_period_spans_calendar_month() {
        let date = Utc.with_ymd_and_hms(2025, 12, 17, 8, 30, 0).unwrap();
        let period = BillingPeriod::month_of(date);
        assert_eq!(period.start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(month_label(month_index(date)), "2025-12");
    }

    #[test]
    fn test_invoice_number_format() {
        let period = BillingPeriod::month_of(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        let number = invoice_number(&period);
        assert!(number.starts_with("INV-202603-"), "{}", number);
        let suffix = &number["INV-202603-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_mrr_counts_active_tenants_only() {
        let prices = PlanPrices::default();
        let mut active = Tenant::new("A", "a", "a@a.edu", Plan::Pro);
        active.status = TenantStatus::Active;
        let trial = Tenant::new("B", "b", "b@b.edu", Plan::Enterprise);
        assert_eq!(monthly_recurring_revenue(&[active, trial], &prices), 14_900);
    }

    #[cfg(feature = "http-client")]
    #[test]
    fn test_stripe_checkout_form() {
        let provider = StripeProvider::new(StripeConfig::default());
        let form = provider.checkout_form(&CheckoutRequest {
            tenant_id: "ten_1".into(),
            plan: Plan::Pro,
            amount_cents: 14_900,
            currency: "usd".into(),
            customer_email: "admin@maple.edu".into(),
        });
        let get = |key: &str| form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("mode"), Some("subscription"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("14900"));
        assert_eq!(get("metadata[plan]"), Some("pro"));
        assert_eq!(get("client_reference_id"), Some("ten_1"));
    }

    #[test]
    fn test_idempotency_key_per_checkout() {
        let request = CheckoutRequest {
            tenant_id: "ten_1".into(),
            plan: Plan::Pro,
            amount_cents: 14_900,
            currency: "usd".into(),
            customer_email: "admin@maple.edu".into(),
        };
        let key = idempotency_key(&request);
        assert!(key.starts_with("checkout-ten_1-pro-"), "{}", key);
        assert_ne!(key, idempotency_key(&request));
    }

    #[cfg(feature = "http-client")]
    #[test]
    fn test_session_request_carries_idempotency_key() {
        let provider = StripeProvider::new(StripeConfig {
            secret_key: "sk_test_1".into(),
            ..StripeConfig::default()
        });
        let form = vec![("mode".to_string(), "subscription".to_string())];
        let request = provider
            .session_request("https://api.stripe.test/v1/checkout/sessions", &form, "checkout-key-1")
            .build()
            .unwrap();
        assert_eq!(request.headers()["Idempotency-Key"], "checkout-key-1");
        assert_eq!(request.headers()["Authorization"], "Bearer sk_test_1");
    }
}
