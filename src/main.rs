use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eduai_api::config::Config;
use eduai_api::db;
use eduai_api::db::cache::QueryCache;
use eduai_api::db::metrics::QueryPerformanceMonitor;
use eduai_api::middleware::auth::JwtSecret;
use eduai_api::routes;
use eduai_api::services::ai::AiClient;
use eduai_api::services::metrics;
use eduai_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    metrics::start(pool.clone());

    let state = AppState {
        db: pool,
        config: config.clone(),
        cache: Arc::new(QueryCache::new()),
        monitor: Arc::new(QueryPerformanceMonitor::new()),
        ai: Arc::new(AiClient::new(&config)),
    };

    // CORS: the configured frontend origin, plus localhost for development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    let app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/change-password", post(routes::auth::change_password))
        // User administration
        .route("/api/users", get(routes::users::list_users).post(routes::users::create_user))
        .route("/api/users/batch", post(routes::users::batch_update_users))
        .route("/api/users/{id}", put(routes::users::update_user).delete(routes::users::deactivate_user))
        // Schools
        .route("/api/schools", get(routes::schools::list_schools).post(routes::schools::create_school))
        .route("/api/schools/{id}", get(routes::schools::get_school).put(routes::schools::update_school))
        .route("/api/schools/{id}/materials", get(routes::schools::list_school_materials))
        // Credits
        .route("/api/credits/balance", get(routes::credits::get_balance))
        .route("/api/credits/transactions", get(routes::credits::list_transactions))
        .route("/api/credits/purchase", post(routes::credits::purchase))
        .route("/api/admin/credits/adjust", post(routes::credits::admin_adjust))
        // Notifications
        .route("/api/notifications", get(routes::notifications::list_notifications))
        .route("/api/notifications/{id}/read", post(routes::notifications::mark_read))
        // Conversations
        .route("/api/conversations", get(routes::conversations::list_sessions))
        .route("/api/conversations/{id}", put(routes::conversations::rename_session).delete(routes::conversations::deactivate_session))
        .route("/api/conversations/{id}/messages", get(routes::conversations::list_messages))
        // Generated files & library
        .route("/api/files", get(routes::files::list_files))
        .route("/api/files/{id}", get(routes::files::get_file))
        .route("/api/files/{id}/share", post(routes::files::share_file))
        // AI relay (SSE)
        .route("/api/ai/chat", post(routes::ai::chat))
        .route("/api/ai/generate-worksheet", post(routes::ai::generate_worksheet))
        // Analytics
        .route("/api/analytics/ai-usage", get(routes::analytics::ai_usage))
        .route("/api/analytics/credits", get(routes::analytics::credits_summary))
        .route("/api/analytics/query-performance", get(routes::analytics::query_performance))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("EduAI Asistent API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
