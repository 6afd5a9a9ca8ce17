use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;

use crate::{
    db,
    models::auth::AuthenticatedUser,
    routes::{forbidden, internal, ok, ApiResult},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// Look-back window in days; defaults to 30.
    pub days: Option<i64>,
}

impl PeriodQuery {
    fn days(&self) -> i32 {
        self.days.unwrap_or(30).clamp(1, 365) as i32
    }
}

fn require_platform_admin(user: &AuthenticatedUser) -> Result<(), crate::routes::ApiError> {
    if user.role == crate::models::user::UserRole::PlatformAdmin {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// AI usage over the period, grouped by request type and model.
pub async fn ai_usage(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult {
    require_platform_admin(&user)?;

    let rows = sqlx::query(
        "SELECT request_type, model_used,
                COUNT(*)::BIGINT AS requests,
                COALESCE(SUM(tokens_used), 0)::BIGINT AS tokens,
                COALESCE(SUM(cost), 0)::DOUBLE PRECISION AS cost,
                COUNT(*) FILTER (WHERE cached)::BIGINT AS cached,
                COUNT(*) FILTER (WHERE NOT success)::BIGINT AS failures,
                COALESCE(AVG(processing_time_ms), 0)::BIGINT AS avg_processing_ms
         FROM ai_requests
         WHERE created_at > NOW() - make_interval(days => $1)
         GROUP BY request_type, model_used
         ORDER BY requests DESC",
    )
    .bind(period.days())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            json!({
                "request_type": row.get::<String, _>("request_type"),
                "model_used": row.get::<String, _>("model_used"),
                "requests": row.get::<i64, _>("requests"),
                "tokens": row.get::<i64, _>("tokens"),
                "cost": row.get::<f64, _>("cost"),
                "cached": row.get::<i64, _>("cached"),
                "failures": row.get::<i64, _>("failures"),
                "avg_processing_ms": row.get::<i64, _>("avg_processing_ms"),
            })
        })
        .collect();

    Ok(ok(json!({ "days": period.days(), "usage": data })))
}

/// Credit flow over the period, grouped by transaction type.
pub async fn credits_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(period): Query<PeriodQuery>,
) -> ApiResult {
    require_platform_admin(&user)?;

    let rows = sqlx::query(
        "SELECT transaction_type,
                COUNT(*)::BIGINT AS transactions,
                COALESCE(SUM(amount), 0)::BIGINT AS total_amount
         FROM credit_transactions
         WHERE created_at > NOW() - make_interval(days => $1)
         GROUP BY transaction_type
         ORDER BY transaction_type",
    )
    .bind(period.days())
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            json!({
                "transaction_type": row.get::<String, _>("transaction_type"),
                "transactions": row.get::<i64, _>("transactions"),
                "total_amount": row.get::<i64, _>("total_amount"),
            })
        })
        .collect();

    Ok(ok(json!({ "days": period.days(), "credits": data })))
}

/// Operational snapshot: per-query timings, slow-query samples, pool
/// occupancy, cache size.
pub async fn query_performance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult {
    require_platform_admin(&user)?;

    let snapshot = state.monitor.snapshot();
    let pool = db::pool_stats(&state.db);

    Ok(ok(json!({
        "queries": snapshot.queries,
        "slow_queries": snapshot.slow_queries,
        "pool": pool,
        "cache_entries": state.cache.len(),
    })))
}
