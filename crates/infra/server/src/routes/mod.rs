//! API routes, mounted under `/api`.

pub mod billing;
pub mod collections;
pub mod experiments;
pub mod support;
pub mod system;
pub mod tenants;
pub mod webhooks;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Routes that need no token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/health", get(system::health))
}

/// Routes behind the admin token.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // Generic records
        .route(
            "/collections/{collection}/records",
            get(collections::list_records).post(collections::create_record),
        )
        .route(
            "/collections/{collection}/records/{id}",
            get(collections::get_record)
                .patch(collections::update_record)
                .delete(collections::delete_record),
        )
        .route("/dashboard", get(system::dashboard))
        .route("/analytics/churn", get(system::churn_analytics))
        // Tenants
        .route("/tenants", post(tenants::create_tenant))
        .route("/tenants/{id}/suspend", post(tenants::suspend_tenant))
        .route("/tenants/{id}/reactivate", post(tenants::reactivate_tenant))
        .route("/tenants/{id}/cancel", post(tenants::cancel_tenant))
        .route("/tenants/{id}/plan", post(tenants::change_plan))
        .route("/tenants/{id}/overview", get(tenants::tenant_overview))
        .route("/tenants/{id}/churn-risk", get(tenants::churn_risk))
        .route("/tenants/{id}/clone", post(tenants::clone_tenant))
        .route("/tenants/{id}/domain", post(tenants::start_domain_verification))
        .route("/tenants/{id}/domain/verify", post(tenants::verify_domain))
        .route("/tenants/{id}/compliance-reports", post(tenants::generate_compliance_report))
        .route("/tenants/{id}/api-keys", post(tenants::issue_api_key))
        // Billing
        .route("/billing/stats", get(billing::billing_stats))
        .route("/billing/projection", get(billing::revenue_projection))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/checkout/complete", post(billing::complete_checkout))
        .route("/billing/overdue", post(billing::mark_overdue))
        // Support
        .route("/tickets/{id}/status", post(support::ticket_status))
        .route("/tickets/{id}/assign", post(support::assign_ticket))
        .route("/incidents", post(support::open_incident))
        .route("/incidents/{id}/updates", post(support::post_incident_update))
        // A/B tests
        .route("/ab-tests/{id}/start", post(experiments::start_test))
        .route("/ab-tests/{id}/pause", post(experiments::pause_test))
        .route("/ab-tests/{id}/complete", post(experiments::complete_test))
        .route("/ab-tests/{id}/assign", post(experiments::assign_variant))
        .route("/ab-tests/{id}/convert", post(experiments::record_conversion))
        .route("/ab-tests/{id}/results", get(experiments::test_results))
        // Webhooks
        .route("/webhooks/{id}/test", post(webhooks::send_test))
        .route("/webhooks/{id}/deliveries", get(webhooks::delivery_history))
        .route("/webhooks/deliveries/{id}/retry", post(webhooks::retry_delivery))
}
