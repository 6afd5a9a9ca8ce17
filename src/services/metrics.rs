use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db;

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by status",
        &["status"]
    ).unwrap();

    pub static ref AI_REQUESTS_COUNTER: CounterVec = register_counter_vec!(
        "api_ai_requests_total",
        "AI relay requests by type and outcome",
        &["request_type", "outcome"]
    ).unwrap();

    pub static ref CREDITS_COUNTER: CounterVec = register_counter_vec!(
        "api_credits_moved_total",
        "Credits moved through the ledger by transaction type",
        &["transaction_type"]
    ).unwrap();

    pub static ref MATERIALS_SHARED_COUNTER: CounterVec = register_counter_vec!(
        "api_materials_shared_total",
        "Generated files shared into school libraries",
        &["file_type"]
    ).unwrap();

    // ── Business gauges ─────────────────────────────────────────────────────
    pub static ref USERS_GAUGE: GaugeVec = register_gauge_vec!(
        "eduai_users_active_total",
        "Active users by role",
        &["role"]
    ).unwrap();

    pub static ref SCHOOLS_GAUGE: Gauge = register_gauge!(
        "eduai_schools_total",
        "Registered schools"
    ).unwrap();

    pub static ref UNREAD_NOTIFICATIONS_GAUGE: Gauge = register_gauge!(
        "eduai_notifications_unread_total",
        "Unread notifications across all recipients"
    ).unwrap();

    pub static ref POOL_SIZE_GAUGE: Gauge = register_gauge!(
        "eduai_db_pool_connections",
        "Open connections in the database pool"
    ).unwrap();

    pub static ref POOL_IDLE_GAUGE: Gauge = register_gauge!(
        "eduai_db_pool_idle",
        "Idle connections in the database pool"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let user_counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT role, COUNT(*)::BIGINT FROM users WHERE is_active = TRUE GROUP BY role",
    )
    .fetch_all(pool)
    .await?;
    for (role, count) in &user_counts {
        USERS_GAUGE.with_label_values(&[role]).set(*count as f64);
    }

    let schools: i64 = sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM schools")
        .fetch_one(pool)
        .await?;
    SCHOOLS_GAUGE.set(schools as f64);

    let unread: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM notifications WHERE read_at IS NULL")
            .fetch_one(pool)
            .await?;
    UNREAD_NOTIFICATIONS_GAUGE.set(unread as f64);

    let stats = db::pool_stats(pool);
    POOL_SIZE_GAUGE.set(f64::from(stats.size));
    POOL_IDLE_GAUGE.set(stats.idle as f64);

    info!("Metrics: collected ({} roles)", user_counts.len());
    Ok(())
}
