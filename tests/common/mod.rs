#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use kilo_ledger::adapters::{LogNotifier, MemoryStore};
use kilo_ledger::config::FeeSchedule;
use kilo_ledger::domain::window::offset_hours;
use kilo_ledger::domain::{
    DeliveryRecord, DeliveryTotals, Farmer, Resolution, TimeWindow, Transaction, TransactionQueueEntry, Wallet,
};
use kilo_ledger::gateway::{DisbursementRequest, GatewayAck, GatewayError, RemittanceRequest};
use kilo_ledger::ports::{
    DeliveryRepository, InsertOutcome, LedgerSource, PaymentGateway, RepositoryError, RepositoryResult,
    ResolveOutcome, SettlementRepository,
};
use kilo_ledger::services::{IngestionPipeline, SettlementService, SyncService, WalletLedger};
use kilo_ledger::source::{PageQuery, RawRecord, RetryPolicy, SourceError, SourcePage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

pub fn add_farmer(store: &MemoryStore, code: &str) -> Farmer {
    store.add_farmer(Farmer::new(
        code.to_string(),
        format!("Farmer {}", code),
        "254712345678".to_string(),
        "12345678".to_string(),
    ))
}

pub fn fund(store: &MemoryStore, farmer_id: Uuid, loan_limit: &str, payable: &str) {
    let mut wallet = Wallet::empty(farmer_id);
    wallet.loan_limit = dec(loan_limit);
    wallet.payable_amount = dec(payable);
    store.insert_wallet(wallet);
}

pub fn raw_record(record_id: i64, farmer_code: &str, net_units: f64, gross_pay: f64) -> RawRecord {
    serde_json::from_value(json!({
        "recordID": record_id,
        "farmerCode": farmer_code,
        "transTime": "2025-06-02T06:30:00",
        "idNumber": "12345678",
        "transCode": format!("TC{}", record_id),
        "routeCode": "R1",
        "routeName": "Kapsabet",
        "centreCode": "C1",
        "centreName": "Chepterit",
        "netUnits": net_units,
        "paymentRate": 40.0,
        "grossPay": gross_pay,
        "transportCost": 0.0,
        "transportRecovery": 0.0
    }))
    .unwrap()
}

/// Gateway double that accepts by default and records every request.
#[derive(Default)]
pub struct FakeGateway {
    pub disbursements: Mutex<Vec<DisbursementRequest>>,
    pub remittances: Mutex<Vec<RemittanceRequest>>,
    scripted: Mutex<VecDeque<Result<GatewayAck, GatewayError>>>,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<GatewayAck, GatewayError>) {
        self.scripted.lock().unwrap().push_back(response);
    }

    pub fn disbursement_count(&self) -> usize {
        self.disbursements.lock().unwrap().len()
    }

    fn next(&self) -> Result<GatewayAck, GatewayError> {
        if let Some(response) = self.scripted.lock().unwrap().pop_front() {
            return response;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayAck::accepted(
            format!("AG_TEST_{}", n),
            "Accept the service request successfully.",
        ))
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn disburse(&self, request: &DisbursementRequest) -> Result<GatewayAck, GatewayError> {
        self.disbursements.lock().unwrap().push(request.clone());
        self.next()
    }

    async fn query_balance(&self) -> Result<GatewayAck, GatewayError> {
        Ok(GatewayAck::accepted("AG_BALANCE", "Accept the service request successfully."))
    }

    async fn remit_charge(&self, request: &RemittanceRequest) -> Result<GatewayAck, GatewayError> {
        self.remittances.lock().unwrap().push(request.clone());
        Ok(GatewayAck::accepted("AG_B2B", "Accept the service request successfully."))
    }
}

/// Ledger source serving a fixed record list, paged by `skip`/`take`.
pub struct FakeSource {
    records: Vec<Value>,
    announced_total: Option<u64>,
    fail_at_skip: Option<u64>,
    pub queries: Mutex<Vec<PageQuery>>,
}

impl FakeSource {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            announced_total: None,
            fail_at_skip: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Claims more records than it serves, so later pages come back empty.
    pub fn announcing(mut self, total: u64) -> Self {
        self.announced_total = Some(total);
        self
    }

    pub fn failing_at(mut self, skip: u64) -> Self {
        self.fail_at_skip = Some(skip);
        self
    }

    pub fn skips(&self) -> Vec<u64> {
        self.queries.lock().unwrap().iter().map(|q| q.skip).collect()
    }
}

#[async_trait]
impl LedgerSource for FakeSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<SourcePage, SourceError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_at_skip == Some(query.skip) {
            return Err(SourceError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }

        let matching: Vec<&Value> = self
            .records
            .iter()
            .filter(|r| match &query.farmer_code {
                Some(code) => r["farmerCode"].as_str() == Some(code.as_str()),
                None => true,
            })
            .collect();
        let total = self.announced_total.unwrap_or(matching.len() as u64);
        let page: Vec<Value> = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.take as usize)
            .cloned()
            .collect();

        Ok(serde_json::from_value(json!({"count": total, "transactions": page})).unwrap())
    }
}

pub fn record_json(record_id: i64, farmer_code: &str, gross_pay: f64) -> Value {
    json!({
        "recordID": record_id,
        "farmerCode": farmer_code,
        "transTime": "2025-06-02T06:30:00",
        "netUnits": 10.0,
        "paymentRate": 40.0,
        "grossPay": gross_pay
    })
}

/// Delivery and settlement storage over a `MemoryStore` that can be told to
/// fail its next few writes before they reach the store.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    delivery_failures: AtomicU32,
    open_failures: AtomicU32,
    resolve_failures: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            delivery_failures: AtomicU32::new(0),
            open_failures: AtomicU32::new(0),
            resolve_failures: AtomicU32::new(0),
        }
    }

    /// Next `count` delivery writes fail with a transient error.
    pub fn fail_next_deliveries(&self, count: u32) {
        self.delivery_failures.store(count, Ordering::SeqCst);
    }

    /// Next `count` settlement opens fail with a permanent error.
    pub fn fail_next_opens(&self, count: u32) {
        self.open_failures.store(count, Ordering::SeqCst);
    }

    /// Next `count` resolutions abort with a transient error, as a rolled
    /// back terminal write would.
    pub fn fail_next_resolves(&self, count: u32) {
        self.resolve_failures.store(count, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DeliveryRepository for FaultyStore {
    async fn record_delivery(&self, record: &DeliveryRecord) -> RepositoryResult<InsertOutcome> {
        if Self::take(&self.delivery_failures) {
            return Err(RepositoryError::Transient("connection reset".into()));
        }
        self.inner.record_delivery(record).await
    }

    async fn count_in_window(&self, farmer_id: Uuid, window: &TimeWindow) -> RepositoryResult<u64> {
        self.inner.count_in_window(farmer_id, window).await
    }

    async fn totals_for_farmer(&self, farmer_id: Uuid) -> RepositoryResult<DeliveryTotals> {
        self.inner.totals_for_farmer(farmer_id).await
    }
}

#[async_trait]
impl SettlementRepository for FaultyStore {
    async fn open(&self, entry: &TransactionQueueEntry, transaction: &Transaction) -> RepositoryResult<()> {
        if Self::take(&self.open_failures) {
            return Err(RepositoryError::Database("disk full".into()));
        }
        self.inner.open(entry, transaction).await
    }

    async fn attach_reference(&self, entry_id: Uuid, reference: &str, description: &str) -> RepositoryResult<()> {
        self.inner.attach_reference(entry_id, reference, description).await
    }

    async fn abandon(&self, entry_id: Uuid, description: &str) -> RepositoryResult<bool> {
        self.inner.abandon(entry_id, description).await
    }

    async fn resolve(&self, reference: &str, resolution: &Resolution) -> RepositoryResult<ResolveOutcome> {
        if Self::take(&self.resolve_failures) {
            return Err(RepositoryError::Transient("could not serialize access".into()));
        }
        self.inner.resolve(reference, resolution).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub faults: Arc<FaultyStore>,
    pub ledger: Arc<WalletLedger>,
    pub gateway: Arc<FakeGateway>,
    pub settlement: Arc<SettlementService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let ledger = Arc::new(WalletLedger::new(store.clone(), faults.clone(), retry()));
        let gateway = Arc::new(FakeGateway::new());
        let settlement = Arc::new(SettlementService::new(
            store.clone(),
            faults.clone(),
            ledger.clone(),
            gateway.clone(),
            Arc::new(LogNotifier),
            FeeSchedule::standard(),
            retry(),
            "https://kilo.example".to_string(),
        ));
        Self {
            store,
            faults,
            ledger,
            gateway,
            settlement,
        }
    }

    pub fn pipeline(&self) -> Arc<IngestionPipeline> {
        Arc::new(IngestionPipeline::new(
            self.store.clone(),
            self.ledger.clone(),
            offset_hours(3).unwrap(),
        ))
    }

    pub fn sync_service(&self, source: Arc<FakeSource>, page_size: u32) -> SyncService {
        SyncService::new(
            source,
            self.pipeline(),
            self.store.clone(),
            self.store.clone(),
            page_size,
            2,
            offset_hours(3).unwrap(),
        )
    }
}

/// B2C result body as the gateway posts it.
pub fn payout_callback(reference: &str, code: i64, recipient: &str) -> Value {
    if code != 0 {
        return json!({"Result": {
            "ResultType": 0,
            "ResultCode": code,
            "ResultDesc": "The initiator information is invalid.",
            "OriginatorConversationID": "29112-34801843-1",
            "ConversationID": reference,
            "TransactionID": "NLJ0000000"
        }});
    }
    json!({"Result": {
        "ResultType": 0,
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "OriginatorConversationID": "10571-7910404-1",
        "ConversationID": reference,
        "TransactionID": "NLJ41HAY6Q",
        "ResultParameters": {"ResultParameter": [
            {"Key": "TransactionAmount", "Value": 200},
            {"Key": "TransactionReceipt", "Value": "NLJ41HAY6Q"},
            {"Key": "ReceiverPartyPublicName", "Value": recipient},
            {"Key": "TransactionCompletedDateTime", "Value": "01.06.2025 10:22:11"},
            {"Key": "B2CUtilityAccountAvailableFunds", "Value": 10116.00},
            {"Key": "B2CWorkingAccountAvailableFunds", "Value": 900000.00},
            {"Key": "B2CRecipientIsRegisteredCustomer", "Value": "Y"},
            {"Key": "B2CChargesPaidAccountAvailableFunds", "Value": -4510.00}
        ]}
    }})
}
