use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::auth::Claims;
use crate::models::user::{User, UserRole};
use crate::services::credits::CreditService;
use crate::services::metrics::LOGINS_COUNTER;

/// Credits granted to a freshly registered individual teacher account.
pub const WELCOME_BONUS_CREDITS: i32 = 50;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, school_id, \
     credits_balance, is_active, email_verified, status, last_login_at, created_at, updated_at";

pub struct AuthService;

impl AuthService {
    /// Self-service signup. New accounts are individual teachers; school
    /// accounts are provisioned by admins through the user routes.
    pub async fn register(
        pool: &PgPool,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> anyhow::Result<User> {
        if password.len() < 8 {
            anyhow::bail!("Heslo musí mít alespoň 8 znaků");
        }
        let password_hash = bcrypt::hash(password, 12)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, role)
             VALUES ($1, $2, $3, $4, 'teacher_individual')
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email.trim().to_lowercase())
        .bind(&password_hash)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(pool)
        .await?;

        let user = match CreditService::grant_welcome_bonus(pool, user.id).await {
            Ok(tx) => {
                let mut user = user;
                user.credits_balance = tx.balance_after;
                user
            }
            Err(e) => {
                tracing::warn!("welcome bonus grant failed for {}: {e}", user.id);
                user
            }
        };

        Ok(user)
    }

    pub async fn login(
        pool: &PgPool,
        email: &str,
        password: &str,
        jwt_secret: &str,
        access_ttl_seconds: u64,
    ) -> anyhow::Result<(String, User)> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_active = TRUE"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            anyhow::anyhow!("Neplatné přihlašovací údaje")
        })?;

        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|_| anyhow::anyhow!("Neplatné přihlašovací údaje"))?;
        if !valid {
            LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            anyhow::bail!("Neplatné přihlašovací údaje");
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(pool)
            .await?;

        let role: UserRole = user.role.parse().unwrap_or(UserRole::Teacher);
        let token = Self::generate_access_token(
            user.id,
            role,
            user.school_id,
            jwt_secret,
            access_ttl_seconds,
        )?;

        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        Ok((token, user))
    }

    pub fn generate_access_token(
        user_id: Uuid,
        role: UserRole,
        school_id: Option<Uuid>,
        secret: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            school_id,
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub async fn change_password(
        pool: &PgPool,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> anyhow::Result<()> {
        if new_password.len() < 8 {
            anyhow::bail!("Heslo musí mít alespoň 8 znaků");
        }

        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 AND is_active = TRUE")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        let hash = hash.ok_or_else(|| anyhow::anyhow!("Uživatel nebyl nalezen"))?;

        let valid = bcrypt::verify(current_password, &hash)
            .map_err(|_| anyhow::anyhow!("Současné heslo není správné"))?;
        if !valid {
            anyhow::bail!("Současné heslo není správné");
        }

        let new_hash = bcrypt::hash(new_password, 12)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(new_hash)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_access_token;

    #[test]
    fn access_token_round_trips_through_the_extractor() {
        let user_id = Uuid::new_v4();
        let school_id = Some(Uuid::new_v4());
        let token = AuthService::generate_access_token(
            user_id,
            UserRole::SchoolAdmin,
            school_id,
            "test-secret",
            3600,
        )
        .unwrap();

        let decoded = decode_access_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded.role, UserRole::SchoolAdmin);
        assert_eq!(decoded.school_id, school_id);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = AuthService::generate_access_token(
            Uuid::new_v4(),
            UserRole::Teacher,
            None,
            "secret-a",
            3600,
        )
        .unwrap();
        assert!(decode_access_token(&token, "secret-b").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: UserRole::Teacher,
            school_id: None,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(decode_access_token(&token, "secret").is_err());
    }
}
