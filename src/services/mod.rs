pub mod ai;
pub mod analytics;
pub mod auth;
pub mod credits;
pub mod metrics;
pub mod notifications;
