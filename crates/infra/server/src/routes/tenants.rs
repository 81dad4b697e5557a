//! Tenant lifecycle, cloning, domains, compliance and API keys.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Duration;
use owner_admin::{
    ChurnRisk, CloneOptions, CloneSummary, IssuedApiKey, TenantOverview, VerificationInstructions,
    VerificationResult,
};
use owner_core::{ComplianceReport, Framework, OwnerError, Plan, Tenant};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiJson, ApiPath, ApiResult, optional_body};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuspendRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct DomainRequest {
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportRequest {
    pub framework: Framework,
}

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Lifetime in days; keys without one never expire.
    pub ttl_days: Option<i64>,
}

/// POST /tenants
pub async fn create_tenant(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let tenant = state.admin.tenants().create(form).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// POST /tenants/{id}/suspend
///
/// The body is optional.
pub async fn suspend_tenant(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<Json<Tenant>> {
    let request: SuspendRequest = optional_body(&body)?;
    Ok(Json(state.admin.tenants().suspend(&id, request.reason.as_deref()).await?))
}

/// POST /tenants/{id}/reactivate
pub async fn reactivate_tenant(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.admin.tenants().reactivate(&id).await?))
}

/// POST /tenants/{id}/cancel
pub async fn cancel_tenant(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.admin.tenants().cancel(&id).await?))
}

/// POST /tenants/{id}/plan
pub async fn change_plan(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(request): ApiJson<PlanRequest>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.admin.tenants().change_plan(&id, request.plan).await?))
}

/// GET /tenants/{id}/overview
pub async fn tenant_overview(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<TenantOverview>> {
    Ok(Json(state.admin.tenants().overview(&id).await?))
}

/// GET /tenants/{id}/churn-risk
pub async fn churn_risk(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<ChurnRisk>> {
    Ok(Json(state.admin.churn().score(&id).await?))
}

/// POST /tenants/{id}/clone
pub async fn clone_tenant(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(options): ApiJson<CloneOptions>,
) -> ApiResult<(StatusCode, Json<CloneSummary>)> {
    let summary = state.admin.cloning().clone_tenant(&id, options, state.actor()).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST /tenants/{id}/domain
pub async fn start_domain_verification(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(request): ApiJson<DomainRequest>,
) -> ApiResult<Json<VerificationInstructions>> {
    Ok(Json(state.admin.domains().start_verification(&id, &request.domain).await?))
}

/// POST /tenants/{id}/domain/verify
pub async fn verify_domain(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<VerificationResult>> {
    Ok(Json(state.admin.domains().verify(&id).await?))
}

/// POST /tenants/{id}/compliance-reports
///
/// Defaults to FERPA when no framework is given.
pub async fn generate_compliance_report(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ComplianceReport>)> {
    let request: ReportRequest = optional_body(&body)?;
    let report = state.admin.compliance().generate(&id, request.framework, state.actor()).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// POST /tenants/{id}/api-keys
///
/// The plaintext key is only ever returned here.
pub async fn issue_api_key(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(request): ApiJson<IssueKeyRequest>,
) -> ApiResult<(StatusCode, Json<IssuedApiKey>)> {
    let ttl = match request.ttl_days {
        None => None,
        Some(days) => Some(
            Duration::try_days(days)
                .filter(|_| days > 0)
                .ok_or_else(|| OwnerError::invalid_field("ttl_days", "must be a positive number of days"))?,
        ),
    };
    let issued = state.admin.api_keys().issue(&id, &request.name, request.scopes, ttl).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}
