//! Generic record CRUD over any collection.
//!
//! Writes go through [`CollectionService`](owner_admin::CollectionService),
//! which applies the owner forms and keeps workflow states behind their
//! services.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use owner_core::{Collection, ListQuery, ListResult, Record, into_record};
use serde_json::Value;

use crate::error::{ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::state::AppState;

/// GET /collections/{collection}/records
pub async fn list_records(
    State(state): State<AppState>,
    ApiPath(collection): ApiPath<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<ListResult<Record>>> {
    let collection = Collection::parse(&collection)?;
    Ok(Json(state.admin.records().list(collection, &query).await?))
}

/// POST /collections/{collection}/records
pub async fn create_record(
    State(state): State<AppState>,
    ApiPath(collection): ApiPath<String>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<Record>)> {
    let collection = Collection::parse(&collection)?;
    let created = state.admin.collections().create(collection, into_record(body)?).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /collections/{collection}/records/{id}
pub async fn get_record(
    State(state): State<AppState>,
    ApiPath((collection, id)): ApiPath<(String, String)>,
) -> ApiResult<Json<Record>> {
    let collection = Collection::parse(&collection)?;
    Ok(Json(state.admin.records().require(collection, &id).await?))
}

/// PATCH /collections/{collection}/records/{id}
pub async fn update_record(
    State(state): State<AppState>,
    ApiPath((collection, id)): ApiPath<(String, String)>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Json<Record>> {
    let collection = Collection::parse(&collection)?;
    let updated = state.admin.collections().update(collection, &id, into_record(body)?).await?;
    Ok(Json(updated))
}

/// DELETE /collections/{collection}/records/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    ApiPath((collection, id)): ApiPath<(String, String)>,
) -> ApiResult<StatusCode> {
    let collection = Collection::parse(&collection)?;
    state.admin.records().delete(collection, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use owner_core::OwnerError;
    use serde_json::json;

    fn path(collection: &str, id: &str) -> ApiPath<(String, String)> {
        ApiPath((collection.to_string(), id.to_string()))
    }

    #[tokio::test]
    async fn test_crud_round() {
        let state = test_state().await;
        let (status, Json(created)) = create_record(
            State(state.clone()),
            ApiPath("support_tickets".to_string()),
            ApiJson(json!({
                "tenant_id": "t1",
                "subject": "  Grades <script>x</script>missing ",
                "requester_email": "teacher@maple.edu",
                "status": "open",
                "priority": "normal",
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["subject"], "Grades missing");
        let id = created["id"].as_str().unwrap().to_string();

        let Json(patched) = update_record(
            State(state.clone()),
            path("support_tickets", &id),
            ApiJson(json!({ "assignee": "sam" })),
        )
        .await
        .unwrap();
        assert_eq!(patched["assignee"], "sam");
        assert_eq!(patched["subject"], "Grades missing");

        let Json(listed) = list_records(
            State(state.clone()),
            ApiPath("support_tickets".to_string()),
            ApiQuery(ListQuery::new().filter("assignee = 'sam'")),
        )
        .await
        .unwrap();
        assert_eq!(listed.total_items, 1);

        let status = delete_record(State(state.clone()), path("support_tickets", &id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = get_record(State(state), path("support_tickets", &id)).await.unwrap_err();
        assert!(matches!(err.0, OwnerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_invalid_records() {
        let state = test_state().await;

        let err = create_record(
            State(state.clone()),
            ApiPath("tenants".to_string()),
            ApiJson(json!({ "name": "Maple", "slug": "Not A Slug" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err.0, OwnerError::Validation { .. }));

        let err = create_record(State(state.clone()), ApiPath("tenants".to_string()), ApiJson(json!([1, 2])))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = list_records(State(state), ApiPath("grades".to_string()), ApiQuery(ListQuery::new()))
            .await
            .unwrap_err();
        assert!(matches!(err.0, OwnerError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn test_patch_status_uses_ticket_transitions() {
        let state = test_state().await;
        let (_, Json(created)) = create_record(
            State(state.clone()),
            ApiPath("support_tickets".to_string()),
            ApiJson(json!({
                "tenant_id": "t1",
                "subject": "Report cards missing",
                "requester_email": "office@maple.edu",
                "status": "open",
                "priority": "high",
            })),
        )
        .await
        .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let Json(waiting) = update_record(
            State(state.clone()),
            path("support_tickets", &id),
            ApiJson(json!({ "status": "waiting" })),
        )
        .await
        .unwrap();
        assert_eq!(waiting["status"], "waiting");

        let err = update_record(
            State(state.clone()),
            path("support_tickets", &id),
            ApiJson(json!({ "status": "open" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(matches!(err.0, OwnerError::InvalidTransition { .. }));

        let Json(stored) = get_record(State(state), path("support_tickets", &id)).await.unwrap();
        assert_eq!(stored["status"], "waiting");
    }
}
