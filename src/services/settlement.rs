use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::FeeSchedule;
use crate::domain::money::{is_positive, is_whole, round2};
use crate::domain::{
    Debit, Farmer, Resolution, Transaction, TransactionDetails, TransactionKind, TransactionQueueEntry,
    TransactionStatus,
};
use crate::gateway::callback::{parse_header_lenient, parse_payout_result, PayoutResult};
use crate::gateway::{callback_url, remittance_callback_url, DisbursementRequest, RemittanceRequest};
use crate::ports::{
    FarmerRepository, Notifier, PaymentGateway, RepositoryError, ResolveOutcome, SettlementNotice,
    SettlementRepository,
};
use crate::services::ledger::{LedgerError, WalletLedger};
use crate::source::RetryPolicy;

const AIRTIME_PROVIDER: &str = "Safaricom";

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("{0}")]
    Validation(String),

    #[error("minimum {kind} amount is {minimum}")]
    BelowMinimum { kind: TransactionKind, minimum: BigDecimal },

    #[error("borrowing is blocked for this account")]
    BorrowingBlocked,

    #[error("insufficient funds: {required} required")]
    InsufficientFunds { required: BigDecimal },

    #[error("wallet not found")]
    WalletNotFound,

    #[error("farmer not found")]
    FarmerNotFound,

    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("service temporarily unavailable, please try again later: {0}")]
    TryLater(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "validation",
            SettlementError::BelowMinimum { .. } => "below_minimum",
            SettlementError::BorrowingBlocked => "borrowing_blocked",
            SettlementError::InsufficientFunds { .. } => "insufficient_funds",
            SettlementError::WalletNotFound => "wallet_not_found",
            SettlementError::FarmerNotFound => "farmer_not_found",
            SettlementError::GatewayRejected(_) => "gateway_rejected",
            SettlementError::TryLater(_) => "try_later",
            SettlementError::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for SettlementError {
    fn from(err: RepositoryError) -> Self {
        if err.is_transient() {
            SettlementError::TryLater(err.to_string())
        } else {
            SettlementError::Internal(err.to_string())
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(_) => SettlementError::WalletNotFound,
            LedgerError::InsufficientFunds { required, .. } => SettlementError::InsufficientFunds { required },
            LedgerError::Repository(e) => e.into(),
        }
    }
}

/// Lifecycle of one settlement. Only `Requested` and the terminal states are
/// ever persisted; the middle two live inside a single `request` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementState {
    Requested,
    Reserved,
    GatewaySubmitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    /// `2547XXXXXXXX`. Loans always pay out to the farmer's own phone.
    pub recipient_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReceipt {
    pub transaction_id: Uuid,
    pub queue_entry_id: Uuid,
    pub reference: String,
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    pub charge: BigDecimal,
    pub total_amount: BigDecimal,
    pub status: TransactionStatus,
    pub message: String,
}

/// What happened to an inbound gateway callback. `UnknownReference` is
/// refused so the sender redelivers; every other variant is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Applied(TransactionStatus),
    Duplicate,
    UnknownReference,
    Invalid(String),
}

pub struct SettlementService {
    farmers: Arc<dyn FarmerRepository>,
    settlements: Arc<dyn SettlementRepository>,
    ledger: Arc<WalletLedger>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    fees: FeeSchedule,
    retry: RetryPolicy,
    callback_base_url: String,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        farmers: Arc<dyn FarmerRepository>,
        settlements: Arc<dyn SettlementRepository>,
        ledger: Arc<WalletLedger>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        fees: FeeSchedule,
        retry: RetryPolicy,
        callback_base_url: String,
    ) -> Self {
        Self {
            farmers,
            settlements,
            ledger,
            gateway,
            notifier,
            fees,
            retry,
            callback_base_url,
        }
    }

    /// Debits the wallet, records the pending transaction and hands the payout
    /// to the gateway. Returns as soon as the gateway accepts; the final
    /// status arrives later through `handle_payout_callback`.
    pub async fn request(
        &self,
        farmer_id: Uuid,
        request: SettlementRequest,
    ) -> Result<SettlementReceipt, SettlementError> {
        let kind = request.kind;
        let farmer = self
            .farmers
            .find_by_id(farmer_id)
            .await?
            .ok_or(SettlementError::FarmerNotFound)?;

        let amount = round2(&request.amount);
        let phone = self.validate(&farmer, kind, &amount, request.recipient_phone)?;
        let charge = self.fees.rule(kind).charge_for(&amount);

        let wallet = self.ledger.apply_debit(farmer.id, &amount, &charge).await?;
        transition(farmer.id, kind, SettlementState::Requested, SettlementState::Reserved);

        let debit = Debit::new(&amount, &charge);
        let entry = TransactionQueueEntry::pending(farmer.id, wallet.id, kind);
        let details = match kind {
            TransactionKind::Loan => None,
            TransactionKind::AirtimePurchase => Some(TransactionDetails::Airtime {
                provider: AIRTIME_PROVIDER.to_string(),
                recipient_phone: phone.clone(),
            }),
            TransactionKind::MoneyTransfer => Some(TransactionDetails::Transfer {
                recipient_phone: phone.clone(),
                recipient_name: None,
            }),
        };
        let transaction = Transaction::pending(
            farmer.id,
            wallet.id,
            entry.id,
            kind,
            &debit,
            pending_description(kind).to_string(),
            details,
        );

        let opened = self
            .retry
            .run("settlement-open", || self.settlements.open(&entry, &transaction))
            .await;
        if let Err(e) = opened {
            error!(farmer_id = %farmer.id, kind = %kind, error = %e, "failed to record settlement; reversing debit");
            if let Err(reverse_err) = self.ledger.reverse(farmer.id, &amount, &charge).await {
                error!(
                    farmer_id = %farmer.id,
                    amount = %amount,
                    charge = %charge,
                    error = %reverse_err,
                    operator_action_required = true,
                    "debit could not be reversed after a failed settlement open"
                );
            }
            transition(farmer.id, kind, SettlementState::Reserved, SettlementState::Failed);
            return Err(SettlementError::TryLater(e.to_string()));
        }

        let disbursement = DisbursementRequest {
            kind,
            amount: amount.clone(),
            phone,
            callback_url: callback_url(&self.callback_base_url, kind),
            occasion: transaction.id.to_string(),
        };
        transition(farmer.id, kind, SettlementState::Reserved, SettlementState::GatewaySubmitted);

        let reference = match self.gateway.disburse(&disbursement).await {
            Ok(ack) => match ack.reference {
                Some(reference) if ack.accepted => reference,
                _ => {
                    self.fail_before_acceptance(&entry, &transaction, &ack.description).await;
                    return Err(SettlementError::GatewayRejected(ack.description));
                }
            },
            Err(e) => {
                warn!(transaction_id = %transaction.id, error = %e, "gateway call failed");
                self.fail_before_acceptance(&entry, &transaction, &e.to_string()).await;
                return Err(SettlementError::TryLater(e.to_string()));
            }
        };

        let attached = self
            .retry
            .run("settlement-attach-reference", || {
                self.settlements
                    .attach_reference(entry.id, &reference, "accepted by payment gateway")
            })
            .await;
        if let Err(e) = attached {
            // The payout is already in flight, so the debit stays.
            error!(
                transaction_id = %transaction.id,
                reference = %reference,
                error = %e,
                operator_action_required = true,
                "gateway accepted payout but reference could not be stored"
            );
        }

        info!(
            farmer_id = %farmer.id,
            transaction_id = %transaction.id,
            reference = %reference,
            kind = %kind,
            amount = %amount,
            charge = %charge,
            "settlement submitted"
        );

        Ok(SettlementReceipt {
            transaction_id: transaction.id,
            queue_entry_id: entry.id,
            reference,
            kind,
            amount,
            charge,
            total_amount: transaction.total_amount,
            status: TransactionStatus::Pending,
            message: success_message(kind).to_string(),
        })
    }

    fn validate(
        &self,
        farmer: &Farmer,
        kind: TransactionKind,
        amount: &BigDecimal,
        recipient_phone: Option<String>,
    ) -> Result<String, SettlementError> {
        if !farmer.can_borrow {
            return Err(SettlementError::BorrowingBlocked);
        }
        if !is_positive(amount) {
            return Err(SettlementError::Validation("amount must be greater than zero".into()));
        }
        if !is_whole(amount) {
            return Err(SettlementError::Validation("amount must be a whole number of shillings".into()));
        }
        let rule = self.fees.rule(kind);
        if !rule.meets_minimum(amount) {
            return Err(SettlementError::BelowMinimum {
                kind,
                minimum: rule.minimum_amount(),
            });
        }
        match kind {
            TransactionKind::Loan => Ok(farmer.phone_number.clone()),
            _ => recipient_phone.ok_or_else(|| SettlementError::Validation("phone is required".into())),
        }
    }

    /// `abandon` fails the entry and returns the debit in one commit, so the
    /// wallet is never restored without the entry also leaving `Pending`.
    async fn fail_before_acceptance(&self, entry: &TransactionQueueEntry, transaction: &Transaction, reason: &str) {
        let abandoned = self
            .retry
            .run("settlement-abandon", || self.settlements.abandon(entry.id, reason))
            .await;
        match abandoned {
            Ok(true) => transition(
                transaction.farmer_id,
                transaction.kind,
                SettlementState::GatewaySubmitted,
                SettlementState::Failed,
            ),
            Ok(false) => warn!(entry_id = %entry.id, "entry already terminal; debit not reversed"),
            Err(e) => error!(
                entry_id = %entry.id,
                transaction_id = %transaction.id,
                total_amount = %transaction.total_amount,
                error = %e,
                operator_action_required = true,
                "failed to abandon settlement; debit is still held by the pending entry"
            ),
        }
    }

    /// Applies a B2C result to the matching queue entry at most once. A
    /// failed result reverses the debit inside the same commit. A storage
    /// failure is returned so the sender redelivers.
    pub async fn handle_payout_callback(
        &self,
        kind: TransactionKind,
        payload: &Value,
    ) -> Result<CallbackOutcome, SettlementError> {
        let result = match parse_payout_result(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(kind = %kind, error = %e, payload = %payload, "rejecting malformed payout callback");
                return Ok(CallbackOutcome::Invalid(e.to_string()));
            }
        };
        let reference = result.header.reference.clone();
        let resolution = resolution_for(kind, &result);

        let outcome = self
            .retry
            .run("settlement-resolve", || self.settlements.resolve(&reference, &resolution))
            .await?;

        match outcome {
            ResolveOutcome::UnknownReference => {
                // Usually a result that raced ahead of `attach_reference`;
                // refusing it makes the gateway deliver it again.
                error!(
                    reference = %reference,
                    kind = %kind,
                    result_code = result.header.result_code,
                    operator_action_required = true,
                    "callback for unknown reference; asking the gateway to redeliver"
                );
                Ok(CallbackOutcome::UnknownReference)
            }
            ResolveOutcome::AlreadyComplete(entry) => {
                debug!(reference = %reference, entry_id = %entry.id, "duplicate callback ignored");
                Ok(CallbackOutcome::Duplicate)
            }
            ResolveOutcome::Resolved { entry, transaction } => {
                if transaction.kind != kind {
                    warn!(
                        reference = %reference,
                        expected = %transaction.kind,
                        received_on = %kind,
                        "callback arrived on another kind's endpoint"
                    );
                }
                let state = if transaction.status == TransactionStatus::Completed {
                    SettlementState::Completed
                } else {
                    SettlementState::Failed
                };
                transition(transaction.farmer_id, transaction.kind, SettlementState::GatewaySubmitted, state);

                info!(
                    reference = %reference,
                    entry_id = %entry.id,
                    transaction_id = %transaction.id,
                    status = %transaction.status,
                    "settlement resolved"
                );

                self.after_commit(&transaction).await;
                Ok(CallbackOutcome::Applied(transaction.status))
            }
        }
    }

    async fn after_commit(&self, transaction: &Transaction) {
        let notice = SettlementNotice {
            farmer_id: transaction.farmer_id,
            transaction_id: transaction.id,
            kind: transaction.kind,
            status: transaction.status,
            amount: transaction.amount.clone(),
            description: transaction.description.clone(),
        };
        self.notifier.settlement_resolved(&notice).await;

        if transaction.kind == TransactionKind::MoneyTransfer
            && transaction.status == TransactionStatus::Completed
            && is_positive(&transaction.charge)
        {
            self.remit_charge(transaction).await;
        }
    }

    async fn remit_charge(&self, transaction: &Transaction) {
        let remittance = RemittanceRequest {
            amount: transaction.charge.clone(),
            account_reference: transaction
                .gateway_transaction_id
                .clone()
                .unwrap_or_else(|| transaction.id.simple().to_string()),
            callback_url: remittance_callback_url(&self.callback_base_url),
        };
        match self.gateway.remit_charge(&remittance).await {
            Ok(ack) if ack.accepted => {
                info!(transaction_id = %transaction.id, charge = %transaction.charge, "charge remittance submitted")
            }
            Ok(ack) => error!(
                transaction_id = %transaction.id,
                charge = %transaction.charge,
                reason = %ack.description,
                operator_action_required = true,
                "charge remittance rejected"
            ),
            Err(e) => error!(
                transaction_id = %transaction.id,
                charge = %transaction.charge,
                error = %e,
                operator_action_required = true,
                "charge remittance failed"
            ),
        }
    }

    /// B2B results only need to be recorded in the log.
    pub fn handle_remittance_callback(&self, payload: &Value) -> CallbackOutcome {
        match parse_header_lenient(payload) {
            Ok(header) if header.succeeded() => {
                info!(reference = %header.reference, transaction_id = ?header.transaction_id, "charge remittance completed");
                CallbackOutcome::Applied(TransactionStatus::Completed)
            }
            Ok(header) => {
                error!(
                    reference = %header.reference,
                    result_code = header.result_code,
                    result_desc = %header.result_desc,
                    operator_action_required = true,
                    "charge remittance failed at the gateway"
                );
                CallbackOutcome::Applied(TransactionStatus::Failed)
            }
            Err(e) => {
                warn!(error = %e, payload = %payload, "rejecting malformed remittance callback");
                CallbackOutcome::Invalid(e.to_string())
            }
        }
    }
}

fn resolution_for(kind: TransactionKind, result: &PayoutResult) -> Resolution {
    let header = &result.header;
    if !header.succeeded() {
        return Resolution::failed(header.result_desc.clone(), header.transaction_id.clone());
    }
    let resolution = Resolution::completed(completed_description(kind), header.transaction_id.clone());
    match (kind, &result.recipient) {
        (TransactionKind::MoneyTransfer, Some(recipient)) => {
            resolution.with_details(Some(TransactionDetails::Transfer {
                recipient_phone: recipient.phone.clone(),
                recipient_name: recipient.name.clone(),
            }))
        }
        _ => resolution,
    }
}

fn transition(farmer_id: Uuid, kind: TransactionKind, from: SettlementState, to: SettlementState) {
    debug!(farmer_id = %farmer_id, kind = %kind, from = ?from, to = ?to, "settlement transition");
}

fn pending_description(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Loan => "Loan request",
        TransactionKind::AirtimePurchase => "Airtime purchase",
        TransactionKind::MoneyTransfer => "Money transfer",
    }
}

fn completed_description(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Loan => "Loan disbursed",
        TransactionKind::AirtimePurchase => "Purchased airtime",
        TransactionKind::MoneyTransfer => "Money sent",
    }
}

fn success_message(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Loan => "Loan request successful!",
        TransactionKind::AirtimePurchase => "Airtime purchase successful!",
        TransactionKind::MoneyTransfer => "Money transfer request successful!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::callback::{Recipient, ResultHeader};

    fn header(code: i64) -> ResultHeader {
        ResultHeader {
            reference: "AG_1".into(),
            transaction_id: Some("NLJ41HAY6Q".into()),
            result_code: code,
            result_desc: if code == 0 { "ok".into() } else { "insufficient float".into() },
        }
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(SettlementError::BorrowingBlocked.reason_code(), "borrowing_blocked");
        assert_eq!(
            SettlementError::from(RepositoryError::Transient("deadlock".into())).reason_code(),
            "try_later"
        );
        assert_eq!(
            SettlementError::from(LedgerError::WalletNotFound(Uuid::nil())).reason_code(),
            "wallet_not_found"
        );
    }

    #[test]
    fn test_transfer_resolution_carries_recipient() {
        let result = PayoutResult {
            header: header(0),
            amount: None,
            receipt: None,
            recipient: Some(Recipient {
                phone: "254712345678".into(),
                name: Some("Jane Wanjiku".into()),
            }),
        };
        let resolution = resolution_for(TransactionKind::MoneyTransfer, &result);
        assert_eq!(resolution.status, TransactionStatus::Completed);
        assert!(matches!(
            resolution.details,
            Some(TransactionDetails::Transfer { recipient_name: Some(ref n), .. }) if n == "Jane Wanjiku"
        ));
    }

    #[test]
    fn test_failed_result_keeps_gateway_description() {
        let result = PayoutResult {
            header: header(2001),
            amount: None,
            receipt: None,
            recipient: None,
        };
        let resolution = resolution_for(TransactionKind::Loan, &result);
        assert_eq!(resolution.status, TransactionStatus::Failed);
        assert_eq!(resolution.description, "insufficient float");
    }
}
