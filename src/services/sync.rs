//! Paging loop over the ledger source, with farmer-scoped, windowed and
//! scheduled variants.

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{Farmer, TimeWindow};
use crate::ports::{DeliveryRepository, FarmerRepository, LedgerSource, RepositoryError};
use crate::services::ingestion::{IngestResult, IngestionPipeline};
use crate::source::PageQuery;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("farmer {0} not found")]
    FarmerNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// `skip` reached the total announced by the first page.
    Exhausted,
    /// A page came back empty before the announced total was reached.
    EmptyPage,
    Cancelled,
    DeadlineReached,
    /// A fetch failed after retries; the next run resumes from `next_skip`.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: u32,
    pub fetched: u64,
    pub applied: u64,
    pub skipped_duplicate: u64,
    pub skipped_unknown_owner: u64,
    pub failed: u64,
    pub next_skip: u64,
    pub total: Option<u64>,
    pub stopped: StopReason,
}

impl SyncReport {
    fn starting_at(skip: u64) -> Self {
        Self {
            pages: 0,
            fetched: 0,
            applied: 0,
            skipped_duplicate: 0,
            skipped_unknown_owner: 0,
            failed: 0,
            next_skip: skip,
            total: None,
            stopped: StopReason::Exhausted,
        }
    }

    fn absorb(&mut self, result: IngestResult) {
        self.applied += result.applied;
        self.skipped_duplicate += result.skipped_duplicate;
        self.skipped_unknown_owner += result.skipped_unknown_owner;
        self.failed += result.failed;
    }
}

/// Cooperative stop request, checked only between pages.
#[derive(Debug, Clone)]
pub struct StopSignal {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new(cancel: watch::Receiver<bool>) -> Self {
        Self {
            cancel: Some(cancel),
            deadline: None,
        }
    }

    pub fn never() -> Self {
        Self {
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, max_run: Duration) -> Self {
        self.deadline = Some(Instant::now() + max_run);
        self
    }

    pub fn check(&self) -> Option<StopReason> {
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Some(StopReason::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::DeadlineReached),
            _ => None,
        }
    }
}

pub struct SyncService {
    source: Arc<dyn LedgerSource>,
    pipeline: Arc<IngestionPipeline>,
    farmers: Arc<dyn FarmerRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    page_size: u32,
    concurrency: usize,
    source_offset: FixedOffset,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn LedgerSource>,
        pipeline: Arc<IngestionPipeline>,
        farmers: Arc<dyn FarmerRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        page_size: u32,
        concurrency: usize,
        source_offset: FixedOffset,
    ) -> Self {
        Self {
            source,
            pipeline,
            farmers,
            deliveries,
            page_size: page_size.max(1),
            concurrency: concurrency.max(1),
            source_offset,
        }
    }

    /// Window used by the daily job: local midnight yesterday until now.
    pub fn daily_window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::since_yesterday(now, self.source_offset)
    }

    /// Window used by farmer-scoped syncs: the current local month.
    pub fn monthly_window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::current_month(now, self.source_offset)
    }

    /// Pages through `window` starting at `initial_skip`, ingesting each page.
    pub async fn run(
        &self,
        window: TimeWindow,
        farmer: Option<&Farmer>,
        initial_skip: u64,
        stop: &StopSignal,
    ) -> SyncReport {
        let mut report = SyncReport::starting_at(initial_skip);
        let mut skip = initial_skip;

        report.stopped = loop {
            if let Some(reason) = stop.check() {
                break reason;
            }
            if matches!(report.total, Some(total) if skip >= total) {
                break StopReason::Exhausted;
            }

            let query = PageQuery {
                skip,
                take: self.page_size,
                window,
                farmer_code: farmer.map(|f| f.farmer_code.clone()),
            };
            let page = match self.source.fetch_page(&query).await {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        skip,
                        farmer_code = ?query.farmer_code,
                        error = %e,
                        "ledger source fetch failed; run aborted"
                    );
                    break StopReason::Aborted(e.to_string());
                }
            };
            report.pages += 1;

            if report.total.is_none() {
                report.total = Some(page.count);
                if skip >= page.count {
                    break StopReason::Exhausted;
                }
            }
            if page.records.is_empty() {
                warn!(skip, total = ?report.total, "empty page before announced total; stopping");
                break StopReason::EmptyPage;
            }

            let result = match farmer {
                Some(farmer) => self.pipeline.ingest_for(farmer, &page.records).await,
                None => self.pipeline.ingest(&page.records).await,
            };
            let fetched = page.records.len() as u64;
            report.fetched += fetched;
            report.absorb(result);
            skip += fetched;
            report.next_skip = skip;
        };

        info!(
            farmer_code = ?farmer.map(|f| f.farmer_code.as_str()),
            pages = report.pages,
            fetched = report.fetched,
            applied = report.applied,
            skipped_duplicate = report.skipped_duplicate,
            skipped_unknown_owner = report.skipped_unknown_owner,
            failed = report.failed,
            next_skip = report.next_skip,
            stopped = ?report.stopped,
            "sync run finished"
        );
        report
    }

    /// Pulls every record in `window`, regardless of farmer.
    pub async fn sync_window(&self, window: TimeWindow, stop: &StopSignal) -> SyncReport {
        self.run(window, None, 0, stop).await
    }

    /// Farmer-scoped sync. Records already stored inside the window are
    /// skipped on the source side; the unique record id still guards replays.
    pub async fn sync_farmer(
        &self,
        farmer: &Farmer,
        window: TimeWindow,
        stop: &StopSignal,
    ) -> Result<SyncReport, SyncError> {
        let stored = self.deliveries.count_in_window(farmer.id, &window).await?;
        Ok(self.run(window, Some(farmer), stored, stop).await)
    }

    pub async fn sync_farmer_by_code(
        &self,
        farmer_code: &str,
        window: TimeWindow,
        stop: &StopSignal,
    ) -> Result<SyncReport, SyncError> {
        let farmer = self
            .farmers
            .find_by_code(farmer_code)
            .await?
            .ok_or_else(|| SyncError::FarmerNotFound(farmer_code.to_string()))?;
        self.sync_farmer(&farmer, window, stop).await
    }

    /// Runs farmer-scoped syncs for every farmer, a bounded number at a time.
    /// One farmer's failure is reported and the rest carry on.
    pub async fn sync_all_farmers(
        &self,
        window: TimeWindow,
        stop: &StopSignal,
    ) -> Result<Vec<(String, Result<SyncReport, SyncError>)>, SyncError> {
        let farmers = self.farmers.list().await?;
        let results = stream::iter(farmers)
            .map(|farmer| async move {
                let result = self.sync_farmer(&farmer, window, stop).await;
                if let Err(e) = &result {
                    error!(farmer_code = %farmer.farmer_code, error = %e, "farmer sync failed");
                }
                (farmer.farmer_code, result)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(results)
    }

    /// Fires the daily window sync on `schedule` until `shutdown` flips.
    pub async fn run_scheduler(self: Arc<Self>, schedule: Schedule, max_run: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("sync schedule has no upcoming fire time; scheduler stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "next ledger sync scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("sync scheduler stopping");
                        return;
                    }
                    continue;
                }
            }

            let stop = StopSignal::new(shutdown.clone()).with_deadline(max_run);
            let window = self.daily_window(Utc::now());
            let report = self.sync_window(window, &stop).await;
            if report.stopped == StopReason::Cancelled {
                info!("sync scheduler stopping");
                return;
            }
        }
    }
}
