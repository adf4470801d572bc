use chrono::FixedOffset;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::Farmer;
use crate::ports::{FarmerRepository, InsertOutcome};
use crate::services::ledger::WalletLedger;
use crate::source::RawRecord;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub applied: u64,
    pub skipped_duplicate: u64,
    pub skipped_unknown_owner: u64,
    pub failed: u64,
}

impl AddAssign for IngestResult {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_unknown_owner += other.skipped_unknown_owner;
        self.failed += other.failed;
    }
}

enum Owner {
    Known(Farmer),
    Unknown,
    LookupFailed,
}

/// Turns fetched records into stored deliveries plus wallet credits. Each
/// record stands alone: a failure is counted and the batch moves on, and the
/// record is picked up again by the next sync because nothing was written.
pub struct IngestionPipeline {
    farmers: Arc<dyn FarmerRepository>,
    ledger: Arc<WalletLedger>,
    source_offset: FixedOffset,
}

impl IngestionPipeline {
    pub fn new(farmers: Arc<dyn FarmerRepository>, ledger: Arc<WalletLedger>, source_offset: FixedOffset) -> Self {
        Self {
            farmers,
            ledger,
            source_offset,
        }
    }

    pub async fn ingest(&self, batch: &[RawRecord]) -> IngestResult {
        self.ingest_with(batch, HashMap::new()).await
    }

    /// Same as `ingest`, with `farmer` already resolved.
    pub async fn ingest_for(&self, farmer: &Farmer, batch: &[RawRecord]) -> IngestResult {
        let mut owners = HashMap::new();
        owners.insert(farmer.farmer_code.clone(), Some(farmer.clone()));
        self.ingest_with(batch, owners).await
    }

    async fn ingest_with(&self, batch: &[RawRecord], mut owners: HashMap<String, Option<Farmer>>) -> IngestResult {
        let mut result = IngestResult::default();

        for record in batch {
            let farmer = match self.owner(record, &mut owners).await {
                Owner::Known(farmer) => farmer,
                Owner::Unknown => {
                    info!(
                        record_id = record.record_id,
                        farmer_code = ?record.farmer_code(),
                        "skipping record for unknown farmer"
                    );
                    result.skipped_unknown_owner += 1;
                    continue;
                }
                Owner::LookupFailed => {
                    result.failed += 1;
                    continue;
                }
            };

            let delivery = match record.normalize(&farmer, self.source_offset) {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(record_id = record.record_id, error = %e, "record could not be normalised");
                    result.failed += 1;
                    continue;
                }
            };

            match self.ledger.record_delivery(&delivery).await {
                Ok(InsertOutcome::Duplicate) => {
                    debug!(record_id = record.record_id, "record already ingested");
                    result.skipped_duplicate += 1;
                }
                Ok(InsertOutcome::Inserted(_)) => result.applied += 1,
                Err(e) => {
                    error!(
                        record_id = record.record_id,
                        farmer_id = %farmer.id,
                        error = %e,
                        "failed to store delivery record; it will be retried on the next sync"
                    );
                    result.failed += 1;
                }
            }
        }

        result
    }

    async fn owner(&self, record: &RawRecord, owners: &mut HashMap<String, Option<Farmer>>) -> Owner {
        let Some(code) = record.farmer_code() else {
            return Owner::Unknown;
        };
        if let Some(cached) = owners.get(code) {
            return match cached {
                Some(farmer) => Owner::Known(farmer.clone()),
                None => Owner::Unknown,
            };
        }

        match self.farmers.find_by_code(code).await {
            Ok(found) => {
                owners.insert(code.to_string(), found.clone());
                match found {
                    Some(farmer) => Owner::Known(farmer),
                    None => Owner::Unknown,
                }
            }
            Err(e) => {
                warn!(record_id = record.record_id, farmer_code = code, error = %e, "farmer lookup failed");
                Owner::LookupFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::FlakyDeliveries;
    use crate::adapters::MemoryStore;
    use crate::domain::window::offset_hours;
    use crate::ports::DeliveryRepository;
    use crate::source::RetryPolicy;
    use bigdecimal::BigDecimal;
    use std::time::Duration;

    fn raw(record_id: i64, farmer_code: &str, gross_pay: f64) -> RawRecord {
        serde_json::from_value(serde_json::json!({
            "recordID": record_id,
            "farmerCode": farmer_code,
            "transTime": "2025-06-02T06:30:00",
            "netUnits": 10.0,
            "paymentRate": 40.0,
            "grossPay": gross_pay
        }))
        .unwrap()
    }

    fn pipeline(store: &Arc<MemoryStore>, deliveries: Arc<dyn DeliveryRepository>) -> IngestionPipeline {
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        let ledger = Arc::new(WalletLedger::new(store.clone(), deliveries, retry));
        IngestionPipeline::new(store.clone(), ledger, offset_hours(3).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_owner_and_bad_record_do_not_abort_batch() {
        let store = Arc::new(MemoryStore::new());
        let farmer = store.add_farmer(Farmer::new("F-1".into(), "A".into(), "254700000001".into(), "1".into()));

        let mut broken = raw(3, "F-1", 100.0);
        broken.gross_pay = None;
        let batch = vec![raw(1, "F-1", 400.0), raw(2, "F-404", 100.0), broken, raw(4, "F-1", 100.0)];

        let result = pipeline(&store, store.clone()).ingest(&batch).await;

        assert_eq!(
            result,
            IngestResult {
                applied: 2,
                skipped_duplicate: 0,
                skipped_unknown_owner: 1,
                failed: 1,
            }
        );
        let wallet = store.wallet(farmer.id).unwrap();
        assert_eq!(wallet.earnings_amount, BigDecimal::from(500));
        assert_eq!(wallet.loan_limit, BigDecimal::from(250));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_and_replay_heals_wallet() {
        let store = Arc::new(MemoryStore::new());
        let farmer = store.add_farmer(Farmer::new("F-1".into(), "A".into(), "254700000001".into(), "1".into()));
        let flaky = Arc::new(FlakyDeliveries::new(store.clone(), 2));
        let pipeline = pipeline(&store, flaky);
        let batch = [raw(1, "F-1", 400.0)];

        let result = pipeline.ingest_for(&farmer, &batch).await;
        assert_eq!(result.failed, 1);
        assert_eq!(store.delivery_count(), 0);
        assert!(store.wallet(farmer.id).is_none());

        let replay = pipeline.ingest_for(&farmer, &batch).await;
        assert_eq!(replay.applied, 1);
        assert_eq!(replay.skipped_duplicate, 0);
        assert_eq!(store.delivery_count(), 1);
        let wallet = store.wallet(farmer.id).unwrap();
        assert_eq!(wallet.earnings_amount, BigDecimal::from(400));
        assert_eq!(wallet.loan_limit, BigDecimal::from(200));
    }
}
