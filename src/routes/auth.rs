use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

use crate::{
    models::auth::AuthenticatedUser,
    models::user::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, User, UserProfile,
    },
    routes::{fail, internal, not_found, ok, ApiResult},
    services::auth::AuthService,
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return Err(fail(StatusCode::BAD_REQUEST, "Neplatná e-mailová adresa"));
    }
    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Jméno a příjmení jsou povinné"));
    }
    if body.password.len() < 8 {
        return Err(fail(StatusCode::BAD_REQUEST, "Heslo musí mít alespoň 8 znaků"));
    }

    let user = AuthService::register(
        &state.db,
        &body.email,
        &body.password,
        body.first_name.trim(),
        body.last_name.trim(),
    )
    .await
    .map_err(|e| {
        // Unique violation on email is the common failure here.
        fail(StatusCode::CONFLICT, &e.to_string())
    })?;

    let token = AuthService::generate_access_token(
        user.id,
        user.role.parse().unwrap_or(crate::models::user::UserRole::TeacherIndividual),
        user.school_id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(internal)?;

    let response = LoginResponse {
        access_token: token,
        user: UserProfile::from(user),
    };
    Ok((
        StatusCode::CREATED,
        ok(serde_json::to_value(response).map_err(internal)?),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult {
    let (token, user) = AuthService::login(
        &state.db,
        &body.email,
        &body.password,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .await
    .map_err(|e| fail(StatusCode::UNAUTHORIZED, &e.to_string()))?;

    let response = LoginResponse {
        access_token: token,
        user: UserProfile::from(user),
    };
    Ok(ok(serde_json::to_value(response).map_err(internal)?))
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = TRUE")
        .bind(user.user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    Ok(ok(serde_json::to_value(UserProfile::from(row)).map_err(internal)?))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult {
    AuthService::change_password(
        &state.db,
        user.user_id,
        &body.current_password,
        &body.new_password,
    )
    .await
    .map_err(|e| fail(StatusCode::BAD_REQUEST, &e.to_string()))?;

    Ok(ok(json!({ "message": "Heslo bylo změněno" })))
}
