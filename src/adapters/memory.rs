//! In-process store implementing every repository port. Each operation runs
//! under one mutex, which gives the same indivisibility the SQL adapter gets
//! from single-statement updates. Used by tests and local dry runs.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::money::{round2, zero};
use crate::domain::{
    Debit, DeliveryRecord, DeliveryTotals, Farmer, PaybillBalance, Resolution, TimeWindow,
    Transaction, TransactionQueueEntry, TransactionStatus, Wallet,
};
use crate::ports::{
    DebitOutcome, DeliveryRepository, FarmerRepository, HealthProbe, InsertOutcome,
    PaybillRepository, RepositoryError, RepositoryResult, ResolveOutcome, SettlementRepository,
    WalletRepository,
};

#[derive(Default)]
struct MemoryState {
    farmers: HashMap<Uuid, Farmer>,
    wallets: HashMap<Uuid, Wallet>,
    deliveries: HashMap<i64, DeliveryRecord>,
    entries: HashMap<Uuid, TransactionQueueEntry>,
    transactions: HashMap<Uuid, Transaction>,
    paybill: Option<PaybillBalance>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_farmer(&self, farmer: Farmer) -> Farmer {
        self.state().farmers.insert(farmer.id, farmer.clone());
        farmer
    }

    pub fn set_can_borrow(&self, farmer_id: Uuid, can_borrow: bool) {
        if let Some(farmer) = self.state().farmers.get_mut(&farmer_id) {
            farmer.can_borrow = can_borrow;
        }
    }

    pub fn insert_wallet(&self, wallet: Wallet) {
        self.state().wallets.insert(wallet.farmer_id, wallet);
    }

    pub fn wallet(&self, farmer_id: Uuid) -> Option<Wallet> {
        self.state().wallets.get(&farmer_id).cloned()
    }

    pub fn delivery_count(&self) -> usize {
        self.state().deliveries.len()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state().transactions.values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<TransactionQueueEntry> {
        self.state().entries.values().cloned().collect()
    }
}

#[async_trait]
impl FarmerRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Farmer>> {
        Ok(self.state().farmers.get(&id).cloned())
    }

    async fn find_by_code(&self, farmer_code: &str) -> RepositoryResult<Option<Farmer>> {
        Ok(self
            .state()
            .farmers
            .values()
            .find(|f| f.farmer_code == farmer_code)
            .cloned())
    }

    async fn list(&self) -> RepositoryResult<Vec<Farmer>> {
        let mut farmers: Vec<Farmer> = self.state().farmers.values().cloned().collect();
        farmers.sort_by(|a, b| a.farmer_code.cmp(&b.farmer_code));
        Ok(farmers)
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn find_by_farmer(&self, farmer_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        Ok(self.state().wallets.get(&farmer_id).cloned())
    }

    async fn debit_if_covered(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<DebitOutcome> {
        let mut state = self.state();
        let Some(wallet) = state.wallets.get_mut(&farmer_id) else {
            return Ok(DebitOutcome::Missing);
        };
        if !wallet.can_cover(&debit.total()) {
            return Ok(DebitOutcome::Insufficient(wallet.clone()));
        }
        wallet.apply_debit(debit);
        Ok(DebitOutcome::Applied(wallet.clone()))
    }

    async fn reverse(&self, farmer_id: Uuid, debit: &Debit) -> RepositoryResult<Wallet> {
        let mut state = self.state();
        let wallet = state
            .wallets
            .get_mut(&farmer_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", farmer_id)))?;
        wallet.apply_reversal(debit);
        Ok(wallet.clone())
    }

    async fn reset_all(&self) -> RepositoryResult<u64> {
        let mut state = self.state();
        for wallet in state.wallets.values_mut() {
            wallet.reset();
        }
        Ok(state.wallets.len() as u64)
    }

    async fn set_totals(
        &self,
        farmer_id: Uuid,
        weight: &BigDecimal,
        earnings: &BigDecimal,
    ) -> RepositoryResult<Wallet> {
        let mut state = self.state();
        let wallet = state
            .wallets
            .get_mut(&farmer_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", farmer_id)))?;
        wallet.weight = round2(weight);
        wallet.earnings_amount = round2(earnings);
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }
}

#[async_trait]
impl DeliveryRepository for MemoryStore {
    async fn record_delivery(&self, record: &DeliveryRecord) -> RepositoryResult<InsertOutcome> {
        let mut state = self.state();
        if state.deliveries.contains_key(&record.record_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        state.deliveries.insert(record.record_id, record.clone());
        state
            .wallets
            .entry(record.farmer_id)
            .or_insert_with(|| Wallet::empty(record.farmer_id))
            .apply_delta(&record.wallet_delta().rounded());
        Ok(InsertOutcome::Inserted(record.clone()))
    }

    async fn count_in_window(&self, farmer_id: Uuid, window: &TimeWindow) -> RepositoryResult<u64> {
        Ok(self
            .state()
            .deliveries
            .values()
            .filter(|d| d.farmer_id == farmer_id && window.contains(d.trans_time))
            .count() as u64)
    }

    async fn totals_for_farmer(&self, farmer_id: Uuid) -> RepositoryResult<DeliveryTotals> {
        let state = self.state();
        let mut totals = DeliveryTotals {
            records: 0,
            net_units: zero(),
            gross_pay: zero(),
        };
        for record in state.deliveries.values().filter(|d| d.farmer_id == farmer_id) {
            totals.records += 1;
            totals.net_units = round2(&(&totals.net_units + &record.net_units));
            totals.gross_pay = round2(&(&totals.gross_pay + &record.gross_pay));
        }
        Ok(totals)
    }
}

#[async_trait]
impl SettlementRepository for MemoryStore {
    async fn open(&self, entry: &TransactionQueueEntry, transaction: &Transaction) -> RepositoryResult<()> {
        let mut state = self.state();
        if state.entries.contains_key(&entry.id) || state.transactions.contains_key(&transaction.id) {
            return Err(RepositoryError::Conflict(format!("queue entry {}", entry.id)));
        }
        state.entries.insert(entry.id, entry.clone());
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn attach_reference(&self, entry_id: Uuid, reference: &str, description: &str) -> RepositoryResult<()> {
        let mut state = self.state();
        let taken = state
            .entries
            .values()
            .any(|e| e.id != entry_id && e.reference.as_deref() == Some(reference));
        if taken {
            return Err(RepositoryError::Conflict(format!("reference {}", reference)));
        }
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("queue entry {}", entry_id)))?;
        entry.reference = Some(reference.to_string());
        entry.description = Some(description.to_string());
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn abandon(&self, entry_id: Uuid, description: &str) -> RepositoryResult<bool> {
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("queue entry {}", entry_id)))?;
        if entry.is_complete {
            return Ok(false);
        }
        let transaction = state
            .transactions
            .values_mut()
            .find(|t| t.queue_entry_id == entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction for queue entry {}", entry_id)))?;
        let wallet = state
            .wallets
            .get_mut(&transaction.farmer_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", transaction.farmer_id)))?;

        wallet.apply_reversal(&transaction.debit());

        entry.status = TransactionStatus::Failed;
        entry.is_complete = true;
        entry.description = Some(description.to_string());
        entry.updated_at = Utc::now();

        transaction.status = TransactionStatus::Failed;
        transaction.description = description.to_string();
        transaction.updated_at = Utc::now();
        Ok(true)
    }

    async fn resolve(&self, reference: &str, resolution: &Resolution) -> RepositoryResult<ResolveOutcome> {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(entry) = state
            .entries
            .values_mut()
            .find(|e| e.reference.as_deref() == Some(reference))
        else {
            return Ok(ResolveOutcome::UnknownReference);
        };
        if entry.is_complete {
            return Ok(ResolveOutcome::AlreadyComplete(entry.clone()));
        }
        let entry_id = entry.id;
        let transaction = state
            .transactions
            .values_mut()
            .find(|t| t.queue_entry_id == entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction for queue entry {}", entry_id)))?;

        // Everything that can fail is checked before the first write.
        if resolution.status == TransactionStatus::Failed {
            let wallet = state
                .wallets
                .get_mut(&transaction.farmer_id)
                .ok_or_else(|| RepositoryError::NotFound(format!("wallet for farmer {}", transaction.farmer_id)))?;
            wallet.apply_reversal(&transaction.debit());
        }

        entry.status = resolution.status;
        entry.is_complete = true;
        entry.is_notified = true;
        entry.description = Some(resolution.description.clone());
        entry.updated_at = Utc::now();

        transaction.status = resolution.status;
        transaction.description = resolution.description.clone();
        if resolution.gateway_transaction_id.is_some() {
            transaction.gateway_transaction_id = resolution.gateway_transaction_id.clone();
        }
        if resolution.details.is_some() {
            transaction.details = resolution.details.clone();
        }
        transaction.updated_at = Utc::now();

        Ok(ResolveOutcome::Resolved {
            entry: entry.clone(),
            transaction: transaction.clone(),
        })
    }
}

#[async_trait]
impl PaybillRepository for MemoryStore {
    async fn record_balance(&self, amount: &BigDecimal) -> RepositoryResult<PaybillBalance> {
        let balance = PaybillBalance {
            amount: round2(amount),
            updated_at: Utc::now(),
        };
        self.state().paybill = Some(balance.clone());
        Ok(balance)
    }

    async fn latest(&self) -> RepositoryResult<Option<PaybillBalance>> {
        Ok(self.state().paybill.clone())
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
