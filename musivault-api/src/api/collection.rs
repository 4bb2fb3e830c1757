//! Collection API handlers
//!
//! GET /collection, DELETE /collection/:entryId

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::CollectionItem;
use crate::AppState;

/// GET /collection
///
/// The caller's entries with their catalog records, newest first.
pub async fn list_collection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<CollectionItem>>> {
    let items = crate::db::collection::list_for_owner(&state.db, user.id).await?;
    Ok(Json(items))
}

/// DELETE /collection/:entryId
pub async fn delete_collection_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = crate::db::collection::delete_entry(&state.db, user.id, entry_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "Collection entry not found: {}",
            entry_id
        )));
    }

    tracing::info!(entry_id = %entry_id, user = %user.username, "Collection entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Build collection routes
pub fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/collection", get(list_collection))
        .route("/collection/:entry_id", delete(delete_collection_entry))
}
