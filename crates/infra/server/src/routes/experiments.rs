//! A/B test lifecycle, assignment and results.

use axum::Json;
use axum::extract::State;
use owner_admin::AbTestResults;
use owner_core::AbTest;
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, ApiPath, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct Assignment {
    pub variant: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    pub variant: String,
}

/// POST /ab-tests/{id}/start
pub async fn start_test(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<AbTest>> {
    Ok(Json(state.admin.ab_tests().start(&id).await?))
}

/// POST /ab-tests/{id}/pause
pub async fn pause_test(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<AbTest>> {
    Ok(Json(state.admin.ab_tests().pause(&id).await?))
}

/// POST /ab-tests/{id}/complete
pub async fn complete_test(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<AbTest>> {
    Ok(Json(state.admin.ab_tests().complete(&id).await?))
}

/// POST /ab-tests/{id}/assign
pub async fn assign_variant(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> ApiResult<Json<Assignment>> {
    let variant = state.admin.ab_tests().assign(&id, &body.subject).await?;
    Ok(Json(Assignment { variant }))
}

/// POST /ab-tests/{id}/convert
pub async fn record_conversion(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<ConvertBody>,
) -> ApiResult<Json<AbTest>> {
    Ok(Json(state.admin.ab_tests().convert(&id, &body.variant).await?))
}

/// GET /ab-tests/{id}/results
pub async fn test_results(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<AbTestResults>> {
    Ok(Json(state.admin.ab_tests().results(&id).await?))
}
