//! Async seams between the services and their storage / remote collaborators.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Debit, DeliveryRecord, DeliveryTotals, Farmer, PaybillBalance, Resolution, TimeWindow,
    Transaction, TransactionKind, TransactionQueueEntry, TransactionStatus, Wallet,
};
use crate::gateway::{DisbursementRequest, GatewayAck, GatewayError, RemittanceRequest};
use crate::source::{PageQuery, SourceError, SourcePage};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Safe to retry: serialization failures, deadlocks, pool exhaustion.
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(DeliveryRecord),
    Duplicate,
}

/// Result of the single conditional debit statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    Applied(Wallet),
    /// The wallet exists but does not cover the total; nothing was written.
    Insufficient(Wallet),
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved {
        entry: TransactionQueueEntry,
        transaction: Transaction,
    },
    AlreadyComplete(TransactionQueueEntry),
    UnknownReference,
}

#[async_trait]
pub trait FarmerRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Farmer>>;
    async fn find_by_code(&self, farmer_code: &str) -> RepositoryResult<Option<Farmer>>;
    async fn list(&self) -> RepositoryResult<Vec<Farmer>>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_by_farmer(&self, farmer_id: Uuid) -> RepositoryResult<Option<Wallet>>;

    /// Checks coverage and applies the debit in one indivisible step.
    async fn debit_if_covered(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<DebitOutcome>;

    async fn reverse(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<Wallet>;

    async fn reset_all(&self) -> RepositoryResult<u64>;

    async fn set_totals(
        &self,
        farmer_id: Uuid,
        weight: &BigDecimal,
        earnings: &BigDecimal,
    ) -> RepositoryResult<Wallet>;
}

#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Stores the record and credits its owner's wallet as one atomic write.
    /// A record already stored yields `Duplicate` and changes nothing.
    async fn record_delivery(&self, record: &DeliveryRecord) -> RepositoryResult<InsertOutcome>;
    async fn count_in_window(&self, farmer_id: Uuid, window: &TimeWindow) -> RepositoryResult<u64>;
    async fn totals_for_farmer(&self, farmer_id: Uuid) -> RepositoryResult<DeliveryTotals>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Persists a pending queue entry together with its transaction.
    async fn open(&self, entry: &TransactionQueueEntry, transaction: &Transaction) -> RepositoryResult<()>;

    async fn attach_reference(
        &self,
        entry_id: Uuid,
        reference: &str,
        description: &str,
    ) -> RepositoryResult<()>;

    /// Fails a still-pending entry and its transaction and gives the held
    /// debit back to the wallet, all in one commit. Returns false if the
    /// entry had already reached a terminal state.
    async fn abandon(&self, entry_id: Uuid, description: &str) -> RepositoryResult<bool>;

    /// Applies the terminal transition for `reference` at most once. A failed
    /// resolution reverses the debit in the same commit.
    async fn resolve(&self, reference: &str, resolution: &Resolution) -> RepositoryResult<ResolveOutcome>;
}

#[async_trait]
pub trait PaybillRepository: Send + Sync {
    async fn record_balance(&self, amount: &BigDecimal) -> RepositoryResult<PaybillBalance>;
    async fn latest(&self) -> RepositoryResult<Option<PaybillBalance>>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> RepositoryResult<()>;
}

/// What a farmer is told once a settlement reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementNotice {
    pub farmer_id: Uuid,
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub description: String,
}

/// Post-commit notification sink. Implementations swallow and log their own
/// delivery failures; a lost notice never affects ledger state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn settlement_resolved(&self, notice: &SettlementNotice);
}

#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, SourceError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn disburse(&self, request: &DisbursementRequest) -> Result<GatewayAck, GatewayError>;
    async fn query_balance(&self) -> Result<GatewayAck, GatewayError>;
    async fn remit_charge(&self, request: &RemittanceRequest) -> Result<GatewayAck, GatewayError>;
}
