//! External ledger source: the wire types it serves and the HTTP client
//! that pages through them.

pub mod client;
pub mod retry;
pub mod token;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::money::{from_f64, round2, zero};
use crate::domain::{DeliveryRecord, Farmer, TimeWindow};

pub use client::SourceClient;
pub use retry::{Retryable, RetryPolicy};
pub use token::{AccessToken, TokenCache};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ledger source returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ledger source rejected the access token")]
    Unauthorized,

    #[error("Invalid response from ledger source: {0}")]
    InvalidResponse(String),
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(e) => e.is_timeout() || e.is_connect(),
            SourceError::Status { status, .. } => *status == 503,
            SourceError::Unauthorized | SourceError::InvalidResponse(_) => false,
        }
    }
}

/// One page request. `farmer_code` narrows the query to a single farmer.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub skip: u64,
    pub take: u32,
    pub window: TimeWindow,
    pub farmer_code: Option<String>,
}

impl PageQuery {
    pub fn body(&self) -> QueryBody {
        QueryBody {
            skip: self.skip,
            take: self.take,
            trx_start: self.window.start.to_rfc3339_opts(SecondsFormat::Millis, false),
            trx_end: self.window.end.to_rfc3339_opts(SecondsFormat::Millis, false),
            farmer_code: self.farmer_code.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    pub skip: u64,
    pub take: u32,
    pub trx_start: String,
    pub trx_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farmer_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourcePage {
    #[serde(default)]
    pub count: u64,
    #[serde(default, rename = "transactions")]
    pub records: Vec<RawRecord>,
}

/// A delivery as served by the source, before normalisation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(rename = "recordID")]
    pub record_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub farmer_code: Option<String>,
    #[serde(default)]
    pub trans_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub trans_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub route_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub route_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub centre_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub centre_name: Option<String>,
    #[serde(default)]
    pub net_units: Option<f64>,
    #[serde(default)]
    pub payment_rate: Option<f64>,
    #[serde(default)]
    pub gross_pay: Option<f64>,
    #[serde(default)]
    pub transport_cost: Option<f64>,
    #[serde(default)]
    pub transport_recovery: Option<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("record {record_id} is missing {field}")]
    Missing { record_id: i64, field: &'static str },

    #[error("record {record_id} has an invalid {field}: {value}")]
    Invalid {
        record_id: i64,
        field: &'static str,
        value: String,
    },
}

impl RawRecord {
    pub fn farmer_code(&self) -> Option<&str> {
        self.farmer_code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Converts the wire record into a stored delivery owned by `farmer`.
    /// Timestamps without an offset are read in the source's local offset.
    pub fn normalize(&self, farmer: &Farmer, source_offset: FixedOffset) -> Result<DeliveryRecord, NormalizeError> {
        let raw_time = self.trans_time.as_deref().ok_or(NormalizeError::Missing {
            record_id: self.record_id,
            field: "transTime",
        })?;
        let trans_time = parse_source_time(raw_time, source_offset).ok_or_else(|| NormalizeError::Invalid {
            record_id: self.record_id,
            field: "transTime",
            value: raw_time.to_string(),
        })?;

        let net_units = self.required_amount("netUnits", self.net_units)?;
        let gross_pay = self.required_amount("grossPay", self.gross_pay)?;
        if gross_pay < zero() || net_units < zero() {
            return Err(NormalizeError::Invalid {
                record_id: self.record_id,
                field: "grossPay",
                value: gross_pay.to_string(),
            });
        }

        Ok(DeliveryRecord {
            id: Uuid::new_v4(),
            record_id: self.record_id,
            farmer_id: farmer.id,
            farmer_code: farmer.farmer_code.clone(),
            trans_time,
            id_number: self.id_number.clone().unwrap_or_default(),
            trans_code: self.trans_code.clone().unwrap_or_default(),
            route_code: self.route_code.clone(),
            route_name: self.route_name.clone(),
            centre_code: self.centre_code.clone(),
            centre_name: self.centre_name.clone(),
            net_units,
            payment_rate: self.optional_amount("paymentRate", self.payment_rate)?,
            gross_pay,
            transport_cost: self.optional_amount("transportCost", self.transport_cost)?,
            transport_recovery: self.optional_amount("transportRecovery", self.transport_recovery)?,
            created_at: Utc::now(),
        })
    }

    fn required_amount(&self, field: &'static str, value: Option<f64>) -> Result<BigDecimal, NormalizeError> {
        let value = value.ok_or(NormalizeError::Missing {
            record_id: self.record_id,
            field,
        })?;
        self.to_decimal(field, value)
    }

    fn optional_amount(&self, field: &'static str, value: Option<f64>) -> Result<BigDecimal, NormalizeError> {
        match value {
            Some(v) => self.to_decimal(field, v),
            None => Ok(zero()),
        }
    }

    fn to_decimal(&self, field: &'static str, value: f64) -> Result<BigDecimal, NormalizeError> {
        from_f64(value).map(|d| round2(&d)).ok_or(NormalizeError::Invalid {
            record_id: self.record_id,
            field,
            value: value.to_string(),
        })
    }
}

pub fn parse_source_time(raw: &str, source_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| source_offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
}

/// Accepts a string or a number and keeps it as text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
