//! Fault-injecting wrappers for unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::MemoryStore;
use crate::domain::{DeliveryRecord, DeliveryTotals, TimeWindow};
use crate::ports::{DeliveryRepository, InsertOutcome, RepositoryError, RepositoryResult};

/// Fails the first `failures` delivery writes with a transient error before
/// anything reaches the store, then delegates.
pub(crate) struct FlakyDeliveries {
    inner: Arc<MemoryStore>,
    failures: AtomicU32,
}

impl FlakyDeliveries {
    pub(crate) fn new(inner: Arc<MemoryStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl DeliveryRepository for FlakyDeliveries {
    async fn record_delivery(&self, record: &DeliveryRecord) -> RepositoryResult<InsertOutcome> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
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
