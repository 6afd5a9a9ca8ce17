use sqlx::PgPool;

use crate::models::ai::AiRequestRecord;
use crate::services::metrics::AI_REQUESTS_COUNTER;

/// Fire-and-forget append to the `ai_requests` analytics log.
/// Never blocks the relay, never propagates errors (warns on failure).
pub fn log_request(pool: PgPool, record: AiRequestRecord) {
    AI_REQUESTS_COUNTER
        .with_label_values(&[
            &record.request_type,
            if record.success { "success" } else { "failure" },
        ])
        .inc();

    tokio::spawn(async move {
        let res = sqlx::query(
            "INSERT INTO ai_requests
                (user_id, request_type, provider_id, model_used, priority, parameters,
                 tokens_used, processing_time_ms, cost, success, cached)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.user_id)
        .bind(&record.request_type)
        .bind(&record.provider_id)
        .bind(&record.model_used)
        .bind(&record.priority)
        .bind(&record.parameters)
        .bind(record.tokens_used)
        .bind(record.processing_time_ms)
        .bind(record.cost)
        .bind(record.success)
        .bind(record.cached)
        .execute(&pool)
        .await;

        if let Err(e) = res {
            tracing::warn!("ai request log insert failed: {e}");
        }
    });
}
