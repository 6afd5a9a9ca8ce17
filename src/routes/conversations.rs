use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::auth::AuthenticatedUser,
    models::chat::{ChatMessage, ChatSession, RenameSessionRequest},
    models::PaginationQuery,
    routes::{fail, internal, not_found, ok, ApiResult},
    AppState,
};

/// The caller's chat sessions, most recently touched first.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    let rows: Vec<ChatSession> = sqlx::query_as(
        "SELECT * FROM chat_sessions
         WHERE user_id = $1 AND is_active = TRUE
         ORDER BY updated_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(user.user_id)
    .bind(pagination.per_page())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    Ok(ok(serde_json::to_value(rows).map_err(internal)?))
}

async fn owned_session(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<ChatSession, crate::routes::ApiError> {
    sqlx::query_as::<_, ChatSession>(
        "SELECT * FROM chat_sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(internal)?
    .ok_or_else(not_found)
}

/// Messages of one session, oldest first. Ownership enforced.
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    let session = owned_session(&state, user.user_id, session_id).await?;

    let rows: Vec<ChatMessage> = sqlx::query_as(
        "SELECT * FROM chat_messages
         WHERE session_id = $1
         ORDER BY created_at
         LIMIT $2 OFFSET $3",
    )
    .bind(session.id)
    .bind(pagination.per_page())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    Ok(ok(json!({
        "session": session,
        "messages": rows,
    })))
}

pub async fn rename_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<RenameSessionRequest>,
) -> ApiResult {
    if body.title.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Název nesmí být prázdný"));
    }
    owned_session(&state, user.user_id, session_id).await?;

    sqlx::query("UPDATE chat_sessions SET title = $2, updated_at = NOW() WHERE id = $1")
        .bind(session_id)
        .bind(body.title.trim())
        .execute(&state.db)
        .await
        .map_err(internal)?;

    Ok(ok(json!({ "message": "Konverzace byla přejmenována" })))
}

/// Soft delete: the session disappears from listings, messages stay.
pub async fn deactivate_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult {
    owned_session(&state, user.user_id, session_id).await?;

    sqlx::query("UPDATE chat_sessions SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(session_id)
        .execute(&state.db)
        .await
        .map_err(internal)?;

    Ok(ok(json!({ "message": "Konverzace byla odstraněna" })))
}
