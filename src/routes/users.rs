use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db::batch::{self, BatchError, RowUpdate, DEFAULT_BATCH_SIZE},
    db::metrics::timed,
    db::query_builder::{to_arguments, QueryParam, UserQueryBuilder},
    models::auth::AuthenticatedUser,
    models::user::{
        BatchUpdateRequest, CreateUserRequest, UpdateUserRequest, UserFilterQuery, UserListRow,
    },
    routes::{fail, forbidden, internal, not_found, ok, ApiError, ApiResult},
    AppState,
};

const VALID_ROLES: [&str; 6] = [
    "teacher",
    "school_admin",
    "student",
    "platform_admin",
    "teacher_individual",
    "teacher_school",
];

/// Columns the batch endpoint may touch.
const BATCH_COLUMNS: [&str; 3] = ["status", "is_active", "email_verified"];

fn require_admin(user: &AuthenticatedUser) -> Result<(), ApiError> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(forbidden())
    }
}

fn is_platform_admin(user: &AuthenticatedUser) -> bool {
    user.role == crate::models::user::UserRole::PlatformAdmin
}

/// Cache key covering every filter that shapes the result.
fn listing_cache_key(filters: &UserFilterQuery, school_scope: Option<Uuid>) -> String {
    format!(
        "users:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
        filters.search.as_deref().unwrap_or(""),
        filters.role.as_deref().unwrap_or(""),
        school_scope.map(|s| s.to_string()).unwrap_or_default(),
        filters.is_active.map(|v| v.to_string()).unwrap_or_default(),
        filters
            .email_verified
            .map(|v| v.to_string())
            .unwrap_or_default(),
        filters.status.as_deref().unwrap_or(""),
        filters.created_within.as_deref().unwrap_or(""),
        filters.last_login_within.as_deref().unwrap_or(""),
        filters.sort_by.as_deref().unwrap_or(""),
        filters.sort_dir.as_deref().unwrap_or(""),
        filters.page.unwrap_or(1),
        filters.per_page.unwrap_or(20),
    )
}

/// Filtered, sorted, paginated user listing. School admins are pinned to
/// their own school; platform admins may filter by any.
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filters): Query<UserFilterQuery>,
) -> ApiResult {
    require_admin(&user)?;

    let school_scope = if is_platform_admin(&user) {
        filters.school_id
    } else {
        // A school admin without a school sees nothing rather than everything.
        Some(user.school_id.ok_or_else(forbidden)?)
    };

    let cache_key = listing_cache_key(&filters, school_scope);
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(ok(cached));
    }

    let per_page = filters.per_page.unwrap_or(20).clamp(1, 100);
    let page = filters.page.unwrap_or(1).max(1);

    let builder = UserQueryBuilder::new()
        .search(filters.search.as_deref().unwrap_or(""))
        .with_role(filters.role.as_deref())
        .in_school(school_scope)
        .active(filters.is_active)
        .email_verified(filters.email_verified)
        .with_status(filters.status.as_deref())
        .created_within(filters.created_within.as_deref())
        .last_login_within(filters.last_login_within.as_deref())
        .sort_by(filters.sort_by.as_deref(), filters.sort_dir.as_deref())
        .paginate(per_page, (page - 1) * per_page);

    let (count_sql, count_params) = builder.build_count();
    let count_args = to_arguments(&count_params).map_err(internal)?;
    let total: i64 = timed(
        &state.monitor,
        "users.count",
        sqlx::query_scalar_with(&count_sql, count_args).fetch_one(&state.db),
    )
    .await
    .map_err(internal)?;

    let (sql, params) = builder.build();
    let args = to_arguments(&params).map_err(internal)?;
    let rows: Vec<UserListRow> = timed(
        &state.monitor,
        "users.list",
        sqlx::query_as_with(&sql, args).fetch_all(&state.db),
    )
    .await
    .map_err(internal)?;

    let data = json!({
        "users": rows,
        "pagination": {
            "page": page,
            "per_page": per_page,
            "total": total,
        },
    });
    state.cache.set(&cache_key, data.clone(), None);
    Ok(ok(data))
}

/// Create a user (school admin: own school only; platform admin: anywhere).
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_admin(&user)?;

    let role = body.role.as_deref().unwrap_or("teacher_school");
    if !VALID_ROLES.contains(&role) {
        return Err(fail(StatusCode::BAD_REQUEST, "Neplatná role"));
    }

    let school_id = if is_platform_admin(&user) {
        body.school_id
    } else {
        if role == "platform_admin" {
            return Err(forbidden());
        }
        Some(user.school_id.ok_or_else(forbidden)?)
    };

    let password_hash = bcrypt::hash(&body.password, 12).map_err(internal)?;

    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name, role, school_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(body.email.trim().to_lowercase())
    .bind(&password_hash)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .bind(role)
    .bind(school_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| fail(StatusCode::CONFLICT, &e.to_string()))?;

    state.cache.invalidate("users:");

    Ok((
        StatusCode::CREATED,
        ok(json!({
            "id": user_id,
            "email": body.email,
            "first_name": body.first_name,
            "last_name": body.last_name,
            "role": role,
            "school_id": school_id,
        })),
    ))
}

/// Update selected fields of a user. Builds a dynamic SET from the provided
/// fields only.
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(target_id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> ApiResult {
    require_admin(&user)?;

    if let Some(ref r) = body.role {
        if !VALID_ROLES.contains(&r.as_str()) {
            return Err(fail(StatusCode::BAD_REQUEST, "Neplatná role"));
        }
        if r == "platform_admin" && !is_platform_admin(&user) {
            return Err(forbidden());
        }
    }

    // School admins may only touch members of their own school.
    if !is_platform_admin(&user) {
        let admin_school = user.school_id.ok_or_else(forbidden)?;
        let target_school: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT school_id FROM users WHERE id = $1")
                .bind(target_id)
                .fetch_optional(&state.db)
                .await
                .map_err(internal)?;
        let target_school = target_school.ok_or_else(not_found)?;
        if target_school != Some(admin_school) {
            return Err(forbidden());
        }
        // Moving users between schools is a platform-admin operation.
        if body.school_id.is_some() {
            return Err(forbidden());
        }
    }

    let mut sets: Vec<String> = vec![];
    if body.first_name.is_some() { sets.push("first_name = $__".into()); }
    if body.last_name.is_some() { sets.push("last_name = $__".into()); }
    if body.role.is_some() { sets.push("role = $__".into()); }
    if body.school_id.is_some() { sets.push("school_id = $__".into()); }
    if body.is_active.is_some() { sets.push("is_active = $__".into()); }
    if body.email_verified.is_some() { sets.push("email_verified = $__".into()); }
    if body.status.is_some() { sets.push("status = $__".into()); }

    if sets.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Žádné změny k uložení"));
    }

    // Replace $__ placeholders with sequential $n (starting at $2; $1 = id)
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
        "UPDATE users SET {}, updated_at = NOW() WHERE id = $1 RETURNING id",
        sets_sql.join(", ")
    );

    let mut q = sqlx::query_scalar::<_, Uuid>(&sql).bind(target_id);
    if let Some(v) = &body.first_name { q = q.bind(v); }
    if let Some(v) = &body.last_name { q = q.bind(v); }
    if let Some(v) = &body.role { q = q.bind(v); }
    if let Some(v) = body.school_id { q = q.bind(v); }
    if let Some(v) = body.is_active { q = q.bind(v); }
    if let Some(v) = body.email_verified { q = q.bind(v); }
    if let Some(v) = &body.status { q = q.bind(v); }

    q.fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    state.cache.invalidate("users:");
    Ok(ok(json!({ "message": "Uživatel byl upraven" })))
}

/// Soft delete: mark the account inactive.
pub async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(target_id): Path<Uuid>,
) -> ApiResult {
    require_admin(&user)?;

    if target_id == user.user_id {
        return Err(fail(
            StatusCode::BAD_REQUEST,
            "Vlastní účet nelze deaktivovat",
        ));
    }

    let result = if is_platform_admin(&user) {
        sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(target_id)
            .execute(&state.db)
            .await
    } else {
        let school_id = user.school_id.ok_or_else(forbidden)?;
        sqlx::query(
            "UPDATE users SET is_active = FALSE, updated_at = NOW()
             WHERE id = $1 AND school_id = $2",
        )
        .bind(target_id)
        .bind(school_id)
        .execute(&state.db)
        .await
    }
    .map_err(internal)?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }

    state.cache.invalidate("users:");
    Ok(ok(json!({ "message": "Uživatel byl deaktivován" })))
}

/// Batch status update (platform admin). Chunks run in their own
/// transactions; a failure reports how far the run got.
pub async fn batch_update_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<BatchUpdateRequest>,
) -> ApiResult {
    if !is_platform_admin(&user) {
        return Err(forbidden());
    }
    if body.updates.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Žádné změny k uložení"));
    }

    let updates: Vec<RowUpdate> = body
        .updates
        .iter()
        .map(|u| {
            let mut fields: Vec<(String, QueryParam)> = Vec::new();
            if let Some(status) = &u.status {
                fields.push(("status".into(), QueryParam::Text(status.clone())));
            }
            if let Some(active) = u.is_active {
                fields.push(("is_active".into(), QueryParam::Bool(active)));
            }
            if let Some(verified) = u.email_verified {
                fields.push(("email_verified".into(), QueryParam::Bool(verified)));
            }
            RowUpdate { id: u.id, fields }
        })
        .collect();

    let batch_size = body.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    let applied = batch::execute_batch_update(
        &state.db,
        "users",
        &BATCH_COLUMNS,
        &updates,
        batch_size,
    )
    .await
    .map_err(|e| match &e {
        BatchError::DisallowedColumn(_) | BatchError::EmptyUpdate(_) | BatchError::Encode(_) => {
            fail(StatusCode::BAD_REQUEST, &e.to_string())
        }
        BatchError::Db { .. } => internal(e),
    })?;

    state.cache.invalidate("users:");
    Ok(ok(json!({ "updated": applied })))
}
