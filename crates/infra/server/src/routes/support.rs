//! Ticket workflow and incident response.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use owner_admin::NewIncident;
use owner_core::{Incident, IncidentStatus, SupportTicket, TicketStatus};
use serde::Deserialize;

use crate::error::{ApiJson, ApiPath, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TicketStatusBody {
    pub status: TicketStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssignBody {
    /// `None` or blank unassigns.
    pub assignee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncidentUpdateBody {
    pub status: IncidentStatus,
    pub message: String,
}

/// POST /tickets/{id}/status
pub async fn ticket_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<TicketStatusBody>,
) -> ApiResult<Json<SupportTicket>> {
    Ok(Json(state.admin.support().transition(&id, body.status).await?))
}

/// POST /tickets/{id}/assign
pub async fn assign_ticket(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> ApiResult<Json<SupportTicket>> {
    Ok(Json(state.admin.support().assign(&id, body.assignee.as_deref()).await?))
}

/// POST /incidents
pub async fn open_incident(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewIncident>,
) -> ApiResult<(StatusCode, Json<Incident>)> {
    let incident = state.admin.incidents().open(input).await?;
    Ok((StatusCode::CREATED, Json(incident)))
}

/// POST /incidents/{id}/updates
pub async fn post_incident_update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<IncidentUpdateBody>,
) -> ApiResult<Json<Incident>> {
    let incident = state
        .admin
        .incidents()
        .post_update(&id, body.status, &body.message, state.actor())
        .await?;
    Ok(Json(incident))
}
