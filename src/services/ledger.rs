use bigdecimal::BigDecimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Debit, DeliveryRecord, Wallet};
use crate::ports::{DebitOutcome, DeliveryRepository, InsertOutcome, RepositoryError, WalletRepository};
use crate::source::RetryPolicy;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("wallet for farmer {0} not found")]
    WalletNotFound(Uuid),

    #[error("insufficient funds: required {required}, loan limit {loan_limit}, payable {payable}")]
    InsufficientFunds {
        required: BigDecimal,
        loan_limit: BigDecimal,
        payable: BigDecimal,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Authoritative balance store. Every balance change is one indivisible
/// repository operation scoped to a single farmer's wallet.
pub struct WalletLedger {
    wallets: Arc<dyn WalletRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    retry: RetryPolicy,
}

impl WalletLedger {
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            wallets,
            deliveries,
            retry,
        }
    }

    pub async fn wallet(&self, farmer_id: Uuid) -> Result<Wallet, LedgerError> {
        self.wallets
            .find_by_farmer(farmer_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(farmer_id))
    }

    /// Stores a delivery and credits its owner's wallet, creating the wallet
    /// when absent. Both land together or not at all, so a record that failed
    /// here is simply ingested again on the next run.
    pub async fn record_delivery(&self, record: &DeliveryRecord) -> Result<InsertOutcome, LedgerError> {
        let outcome = self
            .retry
            .run("delivery-record", || self.deliveries.record_delivery(record))
            .await?;
        if let InsertOutcome::Inserted(stored) = &outcome {
            debug!(
                record_id = stored.record_id,
                farmer_id = %stored.farmer_id,
                gross_pay = %stored.gross_pay,
                "delivery stored and wallet credited"
            );
        }
        Ok(outcome)
    }

    /// Takes `amount + charge` out of both the credit line and the payable
    /// balance, or fails without touching the wallet.
    pub async fn apply_debit(
        &self,
        farmer_id: Uuid,
        amount: &BigDecimal,
        charge: &BigDecimal,
    ) -> Result<Wallet, LedgerError> {
        let debit = Debit::new(amount, charge);
        match self.wallets.debit_if_covered(farmer_id, &debit).await? {
            DebitOutcome::Applied(wallet) => {
                info!(
                    farmer_id = %farmer_id,
                    total = %debit.total(),
                    loan_limit = %wallet.loan_limit,
                    payable = %wallet.payable_amount,
                    "wallet debited"
                );
                Ok(wallet)
            }
            DebitOutcome::Insufficient(wallet) => {
                warn!(
                    farmer_id = %farmer_id,
                    required = %debit.total(),
                    loan_limit = %wallet.loan_limit,
                    payable = %wallet.payable_amount,
                    "debit rejected: insufficient funds"
                );
                Err(LedgerError::InsufficientFunds {
                    required: debit.total(),
                    loan_limit: wallet.loan_limit,
                    payable: wallet.payable_amount,
                })
            }
            DebitOutcome::Missing => Err(LedgerError::WalletNotFound(farmer_id)),
        }
    }

    /// Compensates a previous `apply_debit` with the same amounts.
    pub async fn reverse(
        &self,
        farmer_id: Uuid,
        amount: &BigDecimal,
        charge: &BigDecimal,
    ) -> Result<Wallet, LedgerError> {
        let debit = Debit::new(amount, charge);
        let result = self
            .retry
            .run("wallet-reversal", || self.wallets.reverse(farmer_id, &debit))
            .await;

        match result {
            Ok(wallet) => {
                info!(farmer_id = %farmer_id, total = %debit.total(), "wallet debit reversed");
                Ok(wallet)
            }
            Err(e) => {
                error!(
                    farmer_id = %farmer_id,
                    amount = %debit.amount,
                    charge = %debit.charge,
                    error = %e,
                    operator_action_required = true,
                    "compensating reversal failed; wallet is short by the debited total"
                );
                Err(e.into())
            }
        }
    }

    /// Zeroes every wallet for the start of a new period.
    pub async fn reset_all(&self) -> Result<u64, LedgerError> {
        let count = self.wallets.reset_all().await?;
        info!(wallets = count, "all wallets reset");
        Ok(count)
    }

    /// Recomputes weight and earnings from the stored deliveries. Credit line,
    /// borrowed and payable balances are left alone.
    pub async fn recalculate(&self, farmer_id: Uuid) -> Result<Wallet, LedgerError> {
        let totals = self.deliveries.totals_for_farmer(farmer_id).await?;
        let wallet = match self
            .wallets
            .set_totals(farmer_id, &totals.net_units, &totals.gross_pay)
            .await
        {
            Ok(wallet) => wallet,
            Err(RepositoryError::NotFound(_)) => return Err(LedgerError::WalletNotFound(farmer_id)),
            Err(e) => return Err(e.into()),
        };
        info!(
            farmer_id = %farmer_id,
            records = totals.records,
            weight = %wallet.weight,
            earnings = %wallet.earnings_amount,
            "wallet recalculated"
        );
        Ok(wallet)
    }
}
