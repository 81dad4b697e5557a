//! Webhook test sends, delivery history and manual retries.

use axum::Json;
use axum::extract::State;
use owner_core::{ListQuery, ListResult, WebhookDelivery};

use crate::error::{ApiPath, ApiQuery, ApiResult};
use crate::state::AppState;

/// POST /webhooks/{id}/test
pub async fn send_test(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<Json<WebhookDelivery>> {
    Ok(Json(state.dispatcher.send_test(&id).await?))
}

/// GET /webhooks/{id}/deliveries
pub async fn delivery_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<ListResult<WebhookDelivery>>> {
    Ok(Json(state.dispatcher.history(&id, &query).await?))
}

/// POST /webhooks/deliveries/{id}/retry
pub async fn retry_delivery(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<WebhookDelivery>> {
    Ok(Json(state.dispatcher.retry(&id).await?))
}
