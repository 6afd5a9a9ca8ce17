use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::{
    models::auth::AuthenticatedUser,
    models::credit::{AdminAdjustRequest, PurchaseRequest, TransactionType},
    models::notification::{NewNotification, Severity},
    models::PaginationQuery,
    routes::{fail, forbidden, internal, not_found, ok, ApiError, ApiResult},
    services::credits::{CreditError, CreditService},
    services::notifications::NotificationService,
    AppState,
};

pub(crate) fn map_credit_error(e: CreditError) -> ApiError {
    match e {
        CreditError::Insufficient { .. } => {
            fail(StatusCode::PAYMENT_REQUIRED, "Nedostatek kreditů")
        }
        CreditError::UserNotFound => not_found(),
        CreditError::ZeroAmount => fail(StatusCode::BAD_REQUEST, "Neplatná částka"),
        CreditError::Db(e) => internal(e),
    }
}

pub async fn get_balance(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult {
    let balance = CreditService::balance(&state.db, user.user_id)
        .await
        .map_err(map_credit_error)?;
    Ok(ok(json!({ "credits_balance": balance })))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult {
    let rows = CreditService::history(
        &state.db,
        user.user_id,
        pagination.per_page(),
        pagination.offset(),
    )
    .await
    .map_err(map_credit_error)?;
    Ok(ok(serde_json::to_value(rows).map_err(internal)?))
}

/// Credit purchase. Payment processing itself lives outside this API; this
/// endpoint books the purchased credits once payment has cleared.
pub async fn purchase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PurchaseRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if body.amount <= 0 {
        return Err(fail(StatusCode::BAD_REQUEST, "Neplatná částka"));
    }

    let tx = CreditService::grant(
        &state.db,
        user.user_id,
        body.amount,
        TransactionType::Purchase,
        Some("Nákup kreditů"),
        body.related_subscription_id,
    )
    .await
    .map_err(map_credit_error)?;

    NotificationService::notify(
        state.db.clone(),
        NewNotification::for_user(
            user.user_id,
            "credits.purchase",
            "Kredity připsány",
            &format!("Na váš účet bylo připsáno {} kreditů.", body.amount),
        ),
    );

    Ok((StatusCode::CREATED, ok(serde_json::to_value(tx).map_err(internal)?)))
}

/// Signed admin adjustment with an audit trail in the ledger and a
/// notification to the affected user.
pub async fn admin_adjust(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AdminAdjustRequest>,
) -> ApiResult {
    if user.role != crate::models::user::UserRole::PlatformAdmin {
        return Err(forbidden());
    }

    let tx = CreditService::adjust(
        &state.db,
        body.user_id,
        body.amount,
        body.description.as_deref(),
    )
    .await
    .map_err(map_credit_error)?;

    let (title, severity) = if body.amount >= 0 {
        ("Kredity připsány", Severity::Info)
    } else {
        ("Kredity odečteny", Severity::Warning)
    };
    NotificationService::notify(
        state.db.clone(),
        NewNotification::for_user(
            body.user_id,
            "credits.admin_adjustment",
            title,
            &format!("Administrátor upravil váš zůstatek o {} kreditů.", body.amount),
        )
        .severity(severity)
        .meta(json!({ "transaction_id": tx.id })),
    );

    Ok(ok(serde_json::to_value(tx).map_err(internal)?))
}
