use sqlx::PgPool;
use uuid::Uuid;

use crate::models::notification::{NewNotification, Notification};

pub struct NotificationService;

impl NotificationService {
    pub async fn create(pool: &PgPool, new: NewNotification) -> anyhow::Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications
                (user_id, school_id, severity, notification_type, title, message, meta)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(new.user_id)
        .bind(new.school_id)
        .bind(new.severity.to_string())
        .bind(&new.notification_type)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.meta)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Fire-and-forget variant for subsystems that must not fail their own
    /// operation over a notification insert.
    pub fn notify(pool: PgPool, new: NewNotification) {
        tokio::spawn(async move {
            if let Err(e) = Self::create(&pool, new).await {
                tracing::warn!("notification insert failed: {e}");
            }
        });
    }

    /// Notifications addressed to the user directly or to their school,
    /// newest first, plus the caller's unread count.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Notification>, i64)> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT n.* FROM notifications n
             WHERE n.user_id = $1
                OR n.school_id = (SELECT school_id FROM users WHERE id = $1)
             ORDER BY n.created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications n
             WHERE (n.user_id = $1
                OR n.school_id = (SELECT school_id FROM users WHERE id = $1))
               AND n.read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok((rows, unread))
    }

    /// Sets `read_at` when the notification is addressed to the caller.
    /// Idempotent: re-reading keeps the original timestamp. Returns whether
    /// a row matched, so routes can map misses to 404.
    pub async fn mark_read(
        pool: &PgPool,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications
             SET read_at = COALESCE(read_at, NOW())
             WHERE id = $1
               AND (user_id = $2
                OR school_id = (SELECT school_id FROM users WHERE id = $2))",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
