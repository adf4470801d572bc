//! Settlement records: the farmer-visible `Transaction` and the
//! `TransactionQueueEntry` tracking the in-flight gateway request.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::round2;
use super::wallet::Debit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Loan,
    AirtimePurchase,
    MoneyTransfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Loan => "loan",
            TransactionKind::AirtimePurchase => "airtime_purchase",
            TransactionKind::MoneyTransfer => "money_transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loan" => Ok(TransactionKind::Loan),
            "airtime_purchase" => Ok(TransactionKind::AirtimePurchase),
            "money_transfer" => Ok(TransactionKind::MoneyTransfer),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Type-specific payload stored alongside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionDetails {
    Airtime {
        provider: String,
        recipient_phone: String,
    },
    Transfer {
        recipient_phone: String,
        recipient_name: Option<String>,
    },
}

/// Permanent financial record visible to the farmer.
/// `total_amount` always equals `amount + charge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub wallet_id: Uuid,
    pub queue_entry_id: Uuid,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub charge: BigDecimal,
    pub total_amount: BigDecimal,
    pub status: TransactionStatus,
    pub description: String,
    pub details: Option<TransactionDetails>,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(
        farmer_id: Uuid,
        wallet_id: Uuid,
        queue_entry_id: Uuid,
        kind: TransactionKind,
        debit: &Debit,
        description: String,
        details: Option<TransactionDetails>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            farmer_id,
            wallet_id,
            queue_entry_id,
            kind,
            amount: round2(&debit.amount),
            charge: round2(&debit.charge),
            total_amount: debit.total(),
            status: TransactionStatus::Pending,
            description,
            details,
            gateway_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn debit(&self) -> Debit {
        Debit::new(&self.amount, &self.charge)
    }
}

/// One in-flight request to the payment gateway. `reference` is set only from
/// the gateway's synchronous acceptance; `is_complete` marks the single
/// honoured terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionQueueEntry {
    pub id: Uuid,
    pub reference: Option<String>,
    pub farmer_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionKind,
    pub is_complete: bool,
    pub is_notified: bool,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionQueueEntry {
    pub fn pending(farmer_id: Uuid, wallet_id: Uuid, kind: TransactionKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: None,
            farmer_id,
            wallet_id,
            kind,
            is_complete: false,
            is_notified: false,
            status: TransactionStatus::Pending,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal outcome applied to a queue entry and its transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: TransactionStatus,
    pub description: String,
    pub gateway_transaction_id: Option<String>,
    pub details: Option<TransactionDetails>,
}

impl Resolution {
    pub fn completed(description: impl Into<String>, gateway_transaction_id: Option<String>) -> Self {
        Self {
            status: TransactionStatus::Completed,
            description: description.into(),
            gateway_transaction_id,
            details: None,
        }
    }

    pub fn failed(description: impl Into<String>, gateway_transaction_id: Option<String>) -> Self {
        Self {
            status: TransactionStatus::Failed,
            description: description.into(),
            gateway_transaction_id,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<TransactionDetails>) -> Self {
        self.details = details;
        self
    }
}

/// Last known gateway utility-account balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaybillBalance {
    pub amount: BigDecimal,
    pub updated_at: DateTime<Utc>,
}
