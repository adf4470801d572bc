//! Payment gateway port types. The HTTP adapter lives in `mpesa`, inbound
//! payload translation in `callback`.

pub mod callback;
pub mod mpesa;

use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::domain::TransactionKind;

pub use mpesa::MpesaGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway authentication failed: {0}")]
    Auth(String),

    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Payout to a mobile-money subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct DisbursementRequest {
    pub kind: TransactionKind,
    pub amount: BigDecimal,
    /// `2547XXXXXXXX` form.
    pub phone: String,
    pub callback_url: String,
    pub occasion: String,
}

/// Business-to-business payment of a collected charge.
#[derive(Debug, Clone, PartialEq)]
pub struct RemittanceRequest {
    pub amount: BigDecimal,
    pub account_reference: String,
    pub callback_url: String,
}

/// Synchronous answer to a gateway request. `reference` is the gateway's
/// conversation id, echoed later by the asynchronous callback.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayAck {
    pub accepted: bool,
    pub reference: Option<String>,
    pub description: String,
}

impl GatewayAck {
    pub fn accepted(reference: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reference: Some(reference.into()),
            description: description.into(),
        }
    }

    pub fn rejected(description: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reference: None,
            description: description.into(),
        }
    }
}

/// Result endpoint the gateway calls back for a given transaction kind.
pub fn callback_url(base_url: &str, kind: TransactionKind) -> String {
    let path = match kind {
        TransactionKind::Loan => "loan",
        TransactionKind::AirtimePurchase => "airtime",
        TransactionKind::MoneyTransfer => "transfer",
    };
    format!("{}/callbacks/b2c/{}", base_url.trim_end_matches('/'), path)
}

pub fn balance_callback_url(base_url: &str) -> String {
    format!("{}/callbacks/b2c/balance", base_url.trim_end_matches('/'))
}

pub fn remittance_callback_url(base_url: &str) -> String {
    format!("{}/callbacks/b2b", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_urls_per_kind() {
        assert_eq!(
            callback_url("https://kilo.example/", TransactionKind::Loan),
            "https://kilo.example/callbacks/b2c/loan"
        );
        assert_eq!(
            callback_url("https://kilo.example", TransactionKind::MoneyTransfer),
            "https://kilo.example/callbacks/b2c/transfer"
        );
        assert_eq!(balance_callback_url("https://kilo.example"), "https://kilo.example/callbacks/b2c/balance");
    }
}
