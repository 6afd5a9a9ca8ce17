//! Credits ledger.
//!
//! Every balance change is a single conditional UPDATE plus a ledger insert
//! inside one transaction, so concurrent spends cannot drive the balance
//! negative and `balance_before`/`balance_after` always chain per user.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::credit::{CreditTransaction, TransactionType};
use crate::services::auth::WELCOME_BONUS_CREDITS;
use crate::services::metrics::CREDITS_COUNTER;

/// Cost of one chat exchange.
pub const CHAT_MESSAGE_COST: i32 = 1;
/// Cost of one worksheet generation.
pub const WORKSHEET_COST: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("insufficient credits: balance {balance}, required {required}")]
    Insufficient { balance: i32, required: i32 },
    #[error("user not found")]
    UserNotFound,
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub struct CreditService;

impl CreditService {
    pub async fn balance(pool: &PgPool, user_id: Uuid) -> Result<i32, CreditError> {
        sqlx::query_scalar("SELECT credits_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(CreditError::UserNotFound)
    }

    pub async fn history(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CreditTransaction>, CreditError> {
        let rows = sqlx::query_as::<_, CreditTransaction>(
            "SELECT * FROM credit_transactions
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn grant(
        pool: &PgPool,
        user_id: Uuid,
        amount: i32,
        transaction_type: TransactionType,
        description: Option<&str>,
        related_subscription_id: Option<Uuid>,
    ) -> Result<CreditTransaction, CreditError> {
        if amount <= 0 {
            return Err(CreditError::ZeroAmount);
        }
        Self::apply(
            pool,
            user_id,
            amount,
            transaction_type,
            description,
            related_subscription_id,
        )
        .await
    }

    /// Deducts `amount` credits as usage. Fails without touching the balance
    /// when the user cannot afford it.
    pub async fn charge(
        pool: &PgPool,
        user_id: Uuid,
        amount: i32,
        description: &str,
    ) -> Result<CreditTransaction, CreditError> {
        if amount <= 0 {
            return Err(CreditError::ZeroAmount);
        }
        Self::apply(
            pool,
            user_id,
            -amount,
            TransactionType::Usage,
            Some(description),
            None,
        )
        .await
    }

    /// Signed admin adjustment; a negative delta that would take the balance
    /// below zero is rejected.
    pub async fn adjust(
        pool: &PgPool,
        user_id: Uuid,
        delta: i32,
        description: Option<&str>,
    ) -> Result<CreditTransaction, CreditError> {
        if delta == 0 {
            return Err(CreditError::ZeroAmount);
        }
        Self::apply(
            pool,
            user_id,
            delta,
            TransactionType::AdminAdjustment,
            description,
            None,
        )
        .await
    }

    pub async fn grant_welcome_bonus(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<CreditTransaction, CreditError> {
        Self::apply(
            pool,
            user_id,
            WELCOME_BONUS_CREDITS,
            TransactionType::Bonus,
            Some("Uvítací kredity"),
            None,
        )
        .await
    }

    async fn apply(
        pool: &PgPool,
        user_id: Uuid,
        delta: i32,
        transaction_type: TransactionType,
        description: Option<&str>,
        related_subscription_id: Option<Uuid>,
    ) -> Result<CreditTransaction, CreditError> {
        let mut tx = pool.begin().await?;

        // Conditional update: the WHERE clause is the non-negative guard,
        // the RETURNING value anchors the ledger row.
        let balance_after: Option<i32> = sqlx::query_scalar(
            "UPDATE users
             SET credits_balance = credits_balance + $2, updated_at = NOW()
             WHERE id = $1 AND credits_balance + $2 >= 0
             RETURNING credits_balance",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance_after) = balance_after else {
            let balance: Option<i32> =
                sqlx::query_scalar("SELECT credits_balance FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match balance {
                Some(balance) => CreditError::Insufficient {
                    balance,
                    required: -delta,
                },
                None => CreditError::UserNotFound,
            });
        };

        let row = sqlx::query_as::<_, CreditTransaction>(
            "INSERT INTO credit_transactions
                (user_id, transaction_type, amount, balance_before, balance_after,
                 description, related_subscription_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(user_id)
        .bind(transaction_type.to_string())
        .bind(delta)
        .bind(balance_after - delta)
        .bind(balance_after)
        .bind(description)
        .bind(related_subscription_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        CREDITS_COUNTER
            .with_label_values(&[&transaction_type.to_string()])
            .inc_by(delta.unsigned_abs() as f64);

        Ok(row)
    }
}
