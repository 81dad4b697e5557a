//! Billing reads and checkout.

use axum::Json;
use axum::extract::State;
use owner_admin::{BillingStats, CheckoutCompletion, CheckoutSession, RevenueProjection};
use owner_core::Plan;
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, ApiQuery, ApiResult};
use crate::state::AppState;

const DEFAULT_HISTORY_MONTHS: usize = 6;
const DEFAULT_FORWARD_MONTHS: usize = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectionQuery {
    pub history: Option<usize>,
    pub forward: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub tenant_id: String,
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct CompleteCheckoutBody {
    pub session_id: String,
    pub tenant_id: String,
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct OverdueSweep {
    pub updated: usize,
}

/// GET /billing/stats
pub async fn billing_stats(State(state): State<AppState>) -> ApiResult<Json<BillingStats>> {
    Ok(Json(state.admin.billing().stats().await?))
}

/// GET /billing/projection?history=6&forward=3
pub async fn revenue_projection(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProjectionQuery>,
) -> ApiResult<Json<RevenueProjection>> {
    let history = query.history.unwrap_or(DEFAULT_HISTORY_MONTHS);
    let forward = query.forward.unwrap_or(DEFAULT_FORWARD_MONTHS);
    Ok(Json(state.admin.billing().projection(history, forward).await?))
}

/// POST /billing/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CheckoutBody>,
) -> ApiResult<Json<CheckoutSession>> {
    Ok(Json(state.admin.billing().create_checkout(&body.tenant_id, body.plan).await?))
}

/// POST /billing/checkout/complete
pub async fn complete_checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CompleteCheckoutBody>,
) -> ApiResult<Json<CheckoutCompletion>> {
    let completion = state
        .admin
        .billing()
        .complete_checkout(&body.session_id, &body.tenant_id, body.plan)
        .await?;
    Ok(Json(completion))
}

/// POST /billing/overdue
pub async fn mark_overdue(State(state): State<AppState>) -> ApiResult<Json<OverdueSweep>> {
    let updated = state.admin.billing().mark_overdue().await?;
    Ok(Json(OverdueSweep { updated }))
}
