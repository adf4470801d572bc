use async_trait::async_trait;
use tracing::info;

use crate::ports::{Notifier, SettlementNotice};

/// Writes settlement outcomes to the log. SMS delivery hooks in here.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn settlement_resolved(&self, notice: &SettlementNotice) {
        info!(
            farmer_id = %notice.farmer_id,
            transaction_id = %notice.transaction_id,
            kind = %notice.kind,
            status = %notice.status,
            amount = %notice.amount,
            "settlement notice: {}",
            notice.description
        );
    }
}
