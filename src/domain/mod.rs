//! Framework-agnostic entities for the wallet ledger and settlement flow.

pub mod delivery;
pub mod farmer;
pub mod money;
pub mod transaction;
pub mod wallet;
pub mod window;

pub use delivery::{DeliveryRecord, DeliveryTotals};
pub use farmer::Farmer;
pub use transaction::{
    PaybillBalance, Resolution, Transaction, TransactionDetails, TransactionKind,
    TransactionQueueEntry, TransactionStatus,
};
pub use wallet::{Debit, Wallet, WalletDelta};
pub use window::TimeWindow;
