// Library exports for binary tools and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use db::cache::QueryCache;
use db::metrics::QueryPerformanceMonitor;
use services::ai::AiClient;

/// Application state shared across all handlers. Cache and monitor are
/// injected here instead of living in globals so tests and tools get their
/// own instances.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub cache: Arc<QueryCache>,
    pub monitor: Arc<QueryPerformanceMonitor>,
    pub ai: Arc<AiClient>,
}
