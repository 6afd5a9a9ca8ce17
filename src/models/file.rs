use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeneratedFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub file_type: String,
    pub title: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SharedMaterial {
    pub id: Uuid,
    pub file_id: Uuid,
    pub school_id: Uuid,
    pub shared_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Library listing row: material joined with its file and sharer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SharedMaterialRow {
    pub id: Uuid,
    pub file_id: Uuid,
    pub title: String,
    pub file_type: String,
    pub shared_by: Uuid,
    pub shared_by_name: String,
    pub created_at: DateTime<Utc>,
}
