use axum::extract::{Path, Query, State};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::auth::AuthenticatedUser,
    models::PaginationQuery,
    routes::{internal, not_found, ok, ApiResult},
    services::notifications::NotificationService,
    AppState,
};

/// Notifications addressed to the caller or their school, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    let (rows, unread) = NotificationService::list_for_user(
        &state.db,
        user.user_id,
        pagination.per_page(),
        pagination.offset(),
    )
    .await
    .map_err(internal)?;

    Ok(ok(json!({
        "notifications": rows,
        "unread_count": unread,
        "pagination": {
            "page": pagination.page(),
            "per_page": pagination.per_page(),
        },
    })))
}

/// Marks one notification read; 404 when it does not exist or is not
/// addressed to the caller.
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult {
    let updated = NotificationService::mark_read(&state.db, user.user_id, notification_id)
        .await
        .map_err(internal)?;

    if !updated {
        return Err(not_found());
    }
    Ok(ok(json!({ "message": "Oznámení označeno jako přečtené" })))
}
