use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Addressed to a user or to a whole school; exactly one of the two is set.
/// Only ever mutated by mark-read, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub severity: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub meta: Option<serde_json::Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload used by backend subsystems when they emit a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub school_id: Option<Uuid>,
    pub severity: Severity,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub meta: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn for_user(user_id: Uuid, notification_type: &str, title: &str, message: &str) -> Self {
        Self {
            user_id: Some(user_id),
            school_id: None,
            severity: Severity::Info,
            notification_type: notification_type.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            meta: None,
        }
    }

    pub fn for_school(school_id: Uuid, notification_type: &str, title: &str, message: &str) -> Self {
        Self {
            user_id: None,
            school_id: Some(school_id),
            severity: Severity::Info,
            notification_type: notification_type.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            meta: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}
