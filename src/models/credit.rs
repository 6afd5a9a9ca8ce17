use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Usage,
    Refund,
    Bonus,
    AdminAdjustment,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Usage => "usage",
            TransactionType::Refund => "refund",
            TransactionType::Bonus => "bonus",
            TransactionType::AdminAdjustment => "admin_adjustment",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "usage" => Ok(TransactionType::Usage),
            "refund" => Ok(TransactionType::Refund),
            "bonus" => Ok(TransactionType::Bonus),
            "admin_adjustment" => Ok(TransactionType::AdminAdjustment),
            _ => Err(anyhow::anyhow!("Unknown transaction_type: {s}")),
        }
    }
}

/// Append-only ledger row. `amount` is signed: positive credits in,
/// negative credits out; `balance_after - balance_before == amount` always.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: String,
    pub amount: i32,
    pub balance_before: i32,
    pub balance_after: i32,
    pub description: Option<String>,
    pub related_subscription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub amount: i32,
    pub related_subscription_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AdminAdjustRequest {
    pub user_id: Uuid,
    /// Signed: positive grants, negative deducts.
    pub amount: i32,
    pub description: Option<String>,
}
