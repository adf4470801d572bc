use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wallet::WalletDelta;

/// One delivery ("kilo") pulled from the ledger source. `record_id` is the
/// source-assigned identifier and the dedup key; a record is stored once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub record_id: i64,
    pub farmer_id: Uuid,
    pub farmer_code: String,
    pub trans_time: DateTime<Utc>,
    pub id_number: String,
    pub trans_code: String,
    pub route_code: Option<String>,
    pub route_name: Option<String>,
    pub centre_code: Option<String>,
    pub centre_name: Option<String>,
    pub net_units: BigDecimal,
    pub payment_rate: BigDecimal,
    pub gross_pay: BigDecimal,
    pub transport_cost: BigDecimal,
    pub transport_recovery: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn wallet_delta(&self) -> WalletDelta {
        WalletDelta::from_delivery(&self.net_units, &self.gross_pay)
    }
}

/// Aggregates over a farmer's stored deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTotals {
    pub records: u64,
    pub net_units: BigDecimal,
    pub gross_pay: BigDecimal,
}
