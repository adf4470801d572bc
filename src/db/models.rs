//! Row types read by the Postgres adapters. Not exposed outside the crate's
//! storage layer; each converts into its domain entity.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    DeliveryRecord, Farmer, PaybillBalance, Transaction, TransactionDetails, TransactionQueueEntry,
    Wallet,
};
use crate::ports::RepositoryError;

#[derive(Debug, FromRow)]
pub struct FarmerRow {
    pub id: Uuid,
    pub farmer_code: String,
    pub name: String,
    pub phone_number: String,
    pub id_number: String,
    pub can_borrow: bool,
    pub created_at: DateTime<Utc>,
}

impl FarmerRow {
    pub fn into_domain(self) -> Farmer {
        Farmer {
            id: self.id,
            farmer_code: self.farmer_code,
            name: self.name,
            phone_number: self.phone_number,
            id_number: self.id_number,
            can_borrow: self.can_borrow,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub weight: BigDecimal,
    pub earnings_amount: BigDecimal,
    pub loan_limit: BigDecimal,
    pub borrowed_amount: BigDecimal,
    pub payable_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRow {
    pub fn into_domain(self) -> Wallet {
        Wallet {
            id: self.id,
            farmer_id: self.farmer_id,
            weight: self.weight,
            earnings_amount: self.earnings_amount,
            loan_limit: self.loan_limit,
            borrowed_amount: self.borrowed_amount,
            payable_amount: self.payable_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DeliveryRow {
    pub id: Uuid,
    pub record_id: i64,
    pub farmer_id: Uuid,
    pub farmer_code: String,
    pub trans_time: DateTime<Utc>,
    pub id_number: String,
    pub trans_code: String,
    pub route_code: Option<String>,
    pub route_name: Option<String>,
    pub centre_code: Option<String>,
    pub centre_name: Option<String>,
    pub net_units: BigDecimal,
    pub payment_rate: BigDecimal,
    pub gross_pay: BigDecimal,
    pub transport_cost: BigDecimal,
    pub transport_recovery: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRow {
    pub fn into_domain(self) -> DeliveryRecord {
        DeliveryRecord {
            id: self.id,
            record_id: self.record_id,
            farmer_id: self.farmer_id,
            farmer_code: self.farmer_code,
            trans_time: self.trans_time,
            id_number: self.id_number,
            trans_code: self.trans_code,
            route_code: self.route_code,
            route_name: self.route_name,
            centre_code: self.centre_code,
            centre_name: self.centre_name,
            net_units: self.net_units,
            payment_rate: self.payment_rate,
            gross_pay: self.gross_pay,
            transport_cost: self.transport_cost,
            transport_recovery: self.transport_recovery,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub wallet_id: Uuid,
    pub queue_entry_id: Uuid,
    pub kind: String,
    pub amount: BigDecimal,
    pub charge: BigDecimal,
    pub total_amount: BigDecimal,
    pub status: String,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_domain(self) -> Result<Transaction, RepositoryError> {
        let details = match self.details {
            Some(value) => Some(
                serde_json::from_value::<TransactionDetails>(value)
                    .map_err(|e| RepositoryError::Database(format!("transaction {} details: {}", self.id, e)))?,
            ),
            None => None,
        };
        Ok(Transaction {
            id: self.id,
            farmer_id: self.farmer_id,
            wallet_id: self.wallet_id,
            queue_entry_id: self.queue_entry_id,
            kind: self.kind.parse().map_err(RepositoryError::Database)?,
            amount: self.amount,
            charge: self.charge,
            total_amount: self.total_amount,
            status: self.status.parse().map_err(RepositoryError::Database)?,
            description: self.description,
            details,
            gateway_transaction_id: self.gateway_transaction_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct QueueEntryRow {
    pub id: Uuid,
    pub reference: Option<String>,
    pub farmer_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: String,
    pub is_complete: bool,
    pub is_notified: bool,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntryRow {
    pub fn into_domain(self) -> Result<TransactionQueueEntry, RepositoryError> {
        Ok(TransactionQueueEntry {
            id: self.id,
            reference: self.reference,
            farmer_id: self.farmer_id,
            wallet_id: self.wallet_id,
            kind: self.kind.parse().map_err(RepositoryError::Database)?,
            is_complete: self.is_complete,
            is_notified: self.is_notified,
            status: self.status.parse().map_err(RepositoryError::Database)?,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PaybillRow {
    pub amount: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

impl PaybillRow {
    pub fn into_domain(self) -> PaybillBalance {
        PaybillBalance {
            amount: self.amount,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DeliveryTotalsRow {
    pub records: i64,
    pub net_units: BigDecimal,
    pub gross_pay: BigDecimal,
}
