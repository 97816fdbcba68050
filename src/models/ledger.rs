use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::ProfileRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Credit,
    Debit,
}

/// Append-only ledger entry. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    /// External payment reference or a generated one. Unique.
    pub transaction_id: String,
    /// Profile id of the balance owner, not the user id.
    pub user_id: String,
    pub owner: ProfileRef,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        owner: &ProfileRef,
        kind: TransactionType,
        amount: i64,
        project_id: Option<String>,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.into(),
            user_id: owner.profile_id.clone(),
            owner: owner.clone(),
            kind,
            amount,
            project_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
}

/// A gateway order awaiting its payment callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Gateway order id.
    #[serde(rename = "_id")]
    pub id: String,
    pub receipt: String,
    pub client_profile_id: String,
    pub credits: i64,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
