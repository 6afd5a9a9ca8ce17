use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Teacher,
    SchoolAdmin,
    Student,
    PlatformAdmin,
    TeacherIndividual,
    TeacherSchool,
}

impl UserRole {
    /// Roles allowed to administer users (scoped to their school unless platform admin).
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::SchoolAdmin | UserRole::PlatformAdmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Teacher => "teacher",
            UserRole::SchoolAdmin => "school_admin",
            UserRole::Student => "student",
            UserRole::PlatformAdmin => "platform_admin",
            UserRole::TeacherIndividual => "teacher_individual",
            UserRole::TeacherSchool => "teacher_school",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(UserRole::Teacher),
            "school_admin" => Ok(UserRole::SchoolAdmin),
            "student" => Ok(UserRole::Student),
            "platform_admin" => Ok(UserRole::PlatformAdmin),
            "teacher_individual" => Ok(UserRole::TeacherIndividual),
            "teacher_school" => Ok(UserRole::TeacherSchool),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// DB row struct — role travels as TEXT, parsed at the edges.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub school_id: Option<Uuid>,
    pub credits_balance: i32,
    pub is_active: bool,
    pub email_verified: bool,
    pub status: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape produced by the admin listing query (joined school name).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserListRow {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub school_id: Option<Uuid>,
    pub school_name: Option<String>,
    pub credits_balance: i32,
    pub is_active: bool,
    pub email_verified: bool,
    pub status: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub school_id: Option<Uuid>,
    pub credits_balance: i32,
    pub email_verified: bool,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            role: u.role.parse().unwrap_or(UserRole::Teacher),
            school_id: u.school_id,
            credits_balance: u.credits_balance,
            email_verified: u.email_verified,
        }
    }
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub school_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub school_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
    pub status: Option<String>,
}

/// Query-string filters for the admin user listing.
#[derive(Debug, Default, Deserialize)]
pub struct UserFilterQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub school_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
    pub status: Option<String>,
    pub created_within: Option<String>,
    pub last_login_within: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUserUpdate {
    pub id: Uuid,
    pub status: Option<String>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdateRequest {
    pub updates: Vec<BatchUserUpdate>,
    pub batch_size: Option<usize>,
}
