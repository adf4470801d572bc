pub mod ingestion;
pub mod ledger;
pub mod paybill;
pub mod settlement;
pub mod sync;

pub use ingestion::{IngestResult, IngestionPipeline};
pub use ledger::{LedgerError, WalletLedger};
pub use paybill::PaybillService;
pub use settlement::{
    CallbackOutcome, SettlementError, SettlementReceipt, SettlementRequest, SettlementService, SettlementState,
};
pub use sync::{StopReason, StopSignal, SyncError, SyncReport, SyncService};
