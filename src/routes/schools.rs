use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::auth::AuthenticatedUser,
    models::file::SharedMaterialRow,
    models::school::{CreateSchoolRequest, School, UpdateSchoolRequest},
    models::PaginationQuery,
    routes::{fail, forbidden, internal, not_found, ok, ApiResult},
    AppState,
};

fn require_platform_admin(user: &AuthenticatedUser) -> Result<(), crate::routes::ApiError> {
    if user.role == crate::models::user::UserRole::PlatformAdmin {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// Whether the caller may read school-scoped data (member or platform admin).
fn can_access_school(user: &AuthenticatedUser, school_id: Uuid) -> bool {
    user.role == crate::models::user::UserRole::PlatformAdmin
        || user.school_id == Some(school_id)
}

pub async fn list_schools(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    require_platform_admin(&user)?;

    let rows: Vec<School> = sqlx::query_as(
        "SELECT * FROM schools ORDER BY name LIMIT $1 OFFSET $2",
    )
    .bind(pagination.per_page())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schools")
        .fetch_one(&state.db)
        .await
        .map_err(internal)?;

    Ok(ok(json!({
        "schools": rows,
        "pagination": {
            "page": pagination.page(),
            "per_page": pagination.per_page(),
            "total": total,
        },
    })))
}

pub async fn create_school(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateSchoolRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_platform_admin(&user)?;

    if body.name.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Název školy je povinný"));
    }

    let school: School = sqlx::query_as(
        "INSERT INTO schools (name, city, address, phone, website)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(body.name.trim())
    .bind(&body.city)
    .bind(&body.address)
    .bind(&body.phone)
    .bind(&body.website)
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        ok(serde_json::to_value(school).map_err(internal)?),
    ))
}

/// School detail with member and shared-material counts.
pub async fn get_school(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(school_id): Path<Uuid>,
) -> ApiResult {
    if !can_access_school(&user, school_id) {
        return Err(forbidden());
    }

    let school: School = sqlx::query_as("SELECT * FROM schools WHERE id = $1")
        .bind(school_id)
        .fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    let members: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE school_id = $1 AND is_active = TRUE")
            .bind(school_id)
            .fetch_one(&state.db)
            .await
            .map_err(internal)?;

    let materials: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM shared_materials WHERE school_id = $1")
            .bind(school_id)
            .fetch_one(&state.db)
            .await
            .map_err(internal)?;

    let mut data = serde_json::to_value(school).map_err(internal)?;
    data["member_count"] = json!(members);
    data["shared_material_count"] = json!(materials);
    Ok(ok(data))
}

pub async fn update_school(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(school_id): Path<Uuid>,
    Json(body): Json<UpdateSchoolRequest>,
) -> ApiResult {
    require_platform_admin(&user)?;

    let mut sets: Vec<String> = vec![];
    if body.name.is_some() { sets.push("name = $__".into()); }
    if body.city.is_some() { sets.push("city = $__".into()); }
    if body.address.is_some() { sets.push("address = $__".into()); }
    if body.phone.is_some() { sets.push("phone = $__".into()); }
    if body.website.is_some() { sets.push("website = $__".into()); }

    if sets.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Žádné změny k uložení"));
    }

    let mut param_idx = 2usize;
    let sets_sql: Vec<String> = sets
        .iter()
        .map(|s| {
            let replaced = s.replace("$__", &format!("${param_idx}"));
            param_idx += 1;
            replaced
        })
        .collect();

    let sql = format!(
        "UPDATE schools SET {}, updated_at = NOW() WHERE id = $1 RETURNING id",
        sets_sql.join(", ")
    );

    let mut q = sqlx::query_scalar::<_, Uuid>(&sql).bind(school_id);
    if let Some(v) = &body.name { q = q.bind(v); }
    if let Some(v) = &body.city { q = q.bind(v); }
    if let Some(v) = &body.address { q = q.bind(v); }
    if let Some(v) = &body.phone { q = q.bind(v); }
    if let Some(v) = &body.website { q = q.bind(v); }

    q.fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    Ok(ok(json!({ "message": "Škola byla upravena" })))
}

/// Shared-material library of a school, newest first.
pub async fn list_school_materials(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(school_id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    if !can_access_school(&user, school_id) {
        return Err(forbidden());
    }

    let rows: Vec<SharedMaterialRow> = sqlx::query_as(
        "SELECT sm.id, sm.file_id, f.title, f.file_type, sm.shared_by,
                CONCAT(u.first_name, ' ', u.last_name) AS shared_by_name,
                sm.created_at
         FROM shared_materials sm
         JOIN generated_files f ON f.id = sm.file_id
         JOIN users u ON u.id = sm.shared_by
         WHERE sm.school_id = $1
         ORDER BY sm.created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(school_id)
    .bind(pagination.per_page())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    Ok(ok(serde_json::to_value(rows).map_err(internal)?))
}
