use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::auth::AuthenticatedUser,
    models::file::{GeneratedFile, SharedMaterial},
    models::notification::NewNotification,
    models::PaginationQuery,
    routes::{fail, forbidden, internal, not_found, ok, ApiResult},
    services::metrics::MATERIALS_SHARED_COUNTER,
    services::notifications::NotificationService,
    AppState,
};

/// The caller's generated files, newest first.
pub async fn list_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    let rows: Vec<GeneratedFile> = sqlx::query_as(
        "SELECT * FROM generated_files
         WHERE user_id = $1
         ORDER BY created_at DESC
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

pub async fn get_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult {
    let file: GeneratedFile =
        sqlx::query_as("SELECT * FROM generated_files WHERE id = $1 AND user_id = $2")
            .bind(file_id)
            .bind(user.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(internal)?
            .ok_or_else(not_found)?;

    Ok(ok(serde_json::to_value(file).map_err(internal)?))
}

/// Shares one of the caller's files into their school library. Sharing the
/// same file twice is a conflict.
pub async fn share_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let school_id = user.school_id.ok_or_else(forbidden)?;

    let file: GeneratedFile =
        sqlx::query_as("SELECT * FROM generated_files WHERE id = $1 AND user_id = $2")
            .bind(file_id)
            .bind(user.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(internal)?
            .ok_or_else(not_found)?;

    let material: Option<SharedMaterial> = sqlx::query_as(
        "INSERT INTO shared_materials (file_id, school_id, shared_by)
         VALUES ($1, $2, $3)
         ON CONFLICT (file_id, school_id) DO NOTHING
         RETURNING *",
    )
    .bind(file_id)
    .bind(school_id)
    .bind(user.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(internal)?;

    let Some(material) = material else {
        return Err(fail(
            StatusCode::CONFLICT,
            "Materiál je již ve školní knihovně",
        ));
    };

    MATERIALS_SHARED_COUNTER
        .with_label_values(&[&file.file_type])
        .inc();

    NotificationService::notify(
        state.db.clone(),
        NewNotification::for_school(
            school_id,
            "library.material_shared",
            "Nový materiál v knihovně",
            &format!("Do školní knihovny byl sdílen materiál „{}“.", file.title),
        )
        .meta(json!({ "file_id": file_id })),
    );

    Ok((
        StatusCode::CREATED,
        ok(serde_json::to_value(material).map_err(internal)?),
    ))
}
