//! Health, dashboard and analytics reads.

use axum::Json;
use axum::extract::State;
use owner_admin::{ChurnRisk, DashboardSummary, RiskLevel};
use serde::{Deserialize, Serialize};

use crate::error::{ApiQuery, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChurnQuery {
    pub min_level: Option<RiskLevel>,
}

/// GET /health
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /dashboard
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardSummary>> {
    Ok(Json(state.admin.dashboard().summary().await?))
}

/// GET /analytics/churn?minLevel=high
///
/// Medium and above unless told otherwise.
pub async fn churn_analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ChurnQuery>,
) -> ApiResult<Json<Vec<ChurnRisk>>> {
    let level = query.min_level.unwrap_or(RiskLevel::Medium);
    Ok(Json(state.admin.churn().at_risk(level).await?))
}
