//! Translation of inbound gateway result payloads.
//!
//! Every result arrives as
//!
//! ```text
//! {"Result": {
//!     "ResultType": 0,
//!     "ResultCode": 0,
//!     "ResultDesc": "...",
//!     "OriginatorConversationID": "...",
//!     "ConversationID": "AG_...",
//!     "TransactionID": "...",
//!     "ResultParameters": {"ResultParameter": [{"Key": "...", "Value": ...}, ...]}
//! }}
//! ```
//!
//! `ResultParameter` may be a single object instead of a list, and
//! `ResultCode` may be sent as a number or a string. Parameters are looked up
//! by `Key` first; when a key is absent the documented position is used.
//!
//! B2C payout results carry, in order:
//!
//! | idx | Key                                   | Example                          |
//! |-----|---------------------------------------|----------------------------------|
//! | 0   | TransactionAmount                     | `200`                            |
//! | 1   | TransactionReceipt                    | `"NLJ41HAY6Q"`                   |
//! | 2   | ReceiverPartyPublicName               | `"254712345678 - Jane Wanjiku"`  |
//! | 3   | TransactionCompletedDateTime          | `"01.06.2025 10:22:11"`          |
//! | 4   | B2CUtilityAccountAvailableFunds       | `10116.00`                       |
//! | 5   | B2CWorkingAccountAvailableFunds       | `900000.00`                      |
//! | 6   | B2CRecipientIsRegisteredCustomer      | `"Y"`                            |
//! | 7   | B2CChargesPaidAccountAvailableFunds   | `-4510.00`                       |
//!
//! Account balance results carry `[0] ActionId` (optional) and
//! `[1] AccountBalance`, a `&`-joined list of
//! `Name|Currency|Available|Current|Reserved|Uncleared` segments.

use bigdecimal::BigDecimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::money::round2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallbackError {
    #[error("callback body has no Result object")]
    MissingResult,

    #[error("callback is missing {0}")]
    MissingField(&'static str),

    #[error("callback field {field} is malformed: {value}")]
    Malformed { field: &'static str, value: String },
}

/// Fields common to every gateway result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultHeader {
    pub reference: String,
    pub transaction_id: Option<String>,
    pub result_code: i64,
    pub result_desc: String,
}

impl ResultHeader {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// `2547XXXXXXXX` form.
    pub phone: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutResult {
    pub header: ResultHeader,
    pub amount: Option<BigDecimal>,
    pub receipt: Option<String>,
    pub recipient: Option<Recipient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceResult {
    pub header: ResultHeader,
    pub utility_available: Option<BigDecimal>,
}

const B2C_KEYS: [&str; 8] = [
    "TransactionAmount",
    "TransactionReceipt",
    "ReceiverPartyPublicName",
    "TransactionCompletedDateTime",
    "B2CUtilityAccountAvailableFunds",
    "B2CWorkingAccountAvailableFunds",
    "B2CRecipientIsRegisteredCustomer",
    "B2CChargesPaidAccountAvailableFunds",
];

const BALANCE_KEYS: [&str; 2] = ["ActionId", "AccountBalance"];

/// Reads the header of any result payload. A successful result must carry a
/// `TransactionID`.
pub fn parse_header(payload: &Value) -> Result<ResultHeader, CallbackError> {
    let result = payload.get("Result").ok_or(CallbackError::MissingResult)?;

    let reference = text(result.get("ConversationID"))
        .filter(|r| !r.is_empty())
        .ok_or(CallbackError::MissingField("ConversationID"))?;

    let result_code = match result.get("ResultCode") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| CallbackError::Malformed {
        field: "ResultCode",
        value: result.get("ResultCode").map(|v| v.to_string()).unwrap_or_default(),
    })?;

    let transaction_id = text(result.get("TransactionID")).filter(|t| !t.is_empty());
    if result_code == 0 && transaction_id.is_none() {
        return Err(CallbackError::MissingField("TransactionID"));
    }

    Ok(ResultHeader {
        reference,
        transaction_id,
        result_code,
        result_desc: text(result.get("ResultDesc")).unwrap_or_default(),
    })
}

/// Translates a B2C payout result (loan, airtime, transfer).
pub fn parse_payout_result(payload: &Value) -> Result<PayoutResult, CallbackError> {
    let header = parse_header(payload)?;
    let params = result_parameters(payload);

    if !header.succeeded() {
        return Ok(PayoutResult {
            header,
            amount: None,
            receipt: None,
            recipient: None,
        });
    }

    let amount = match param(&params, &B2C_KEYS, 0) {
        Some(value) => Some(decimal(value).ok_or_else(|| CallbackError::Malformed {
            field: "TransactionAmount",
            value: value.to_string(),
        })?),
        None => None,
    };

    Ok(PayoutResult {
        header,
        amount,
        receipt: param(&params, &B2C_KEYS, 1).and_then(|v| text(Some(v))),
        recipient: param(&params, &B2C_KEYS, 2)
            .and_then(|v| text(Some(v)))
            .and_then(|name| parse_recipient(&name)),
    })
}

/// Splits `"254712345678 - Jane Wanjiku"` into phone and name. The phone is
/// the first run of digits; the name follows the first `" - "`.
pub fn parse_recipient(public_name: &str) -> Option<Recipient> {
    let digits: String = public_name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let name = public_name
        .split_once(" - ")
        .map(|(_, name)| name.trim().to_string())
        .filter(|n| !n.is_empty());
    Some(Recipient { phone: digits, name })
}

/// Translates an account balance result.
pub fn parse_balance_result(payload: &Value) -> Result<BalanceResult, CallbackError> {
    let header = parse_header_lenient(payload)?;
    if !header.succeeded() {
        return Ok(BalanceResult {
            header,
            utility_available: None,
        });
    }

    let params = result_parameters(payload);
    let balance = param(&params, &BALANCE_KEYS, 1)
        .and_then(|v| text(Some(v)))
        .ok_or(CallbackError::MissingField("AccountBalance"))?;
    let available = parse_utility_available(&balance).ok_or_else(|| CallbackError::Malformed {
        field: "AccountBalance",
        value: balance.clone(),
    })?;

    Ok(BalanceResult {
        header,
        utility_available: Some(available),
    })
}

/// Available funds of the `Utility Account` segment.
pub fn parse_utility_available(account_balance: &str) -> Option<BigDecimal> {
    account_balance.split('&').find_map(|segment| {
        let mut fields = segment.split('|');
        let name = fields.next()?.trim();
        if !name.eq_ignore_ascii_case("Utility Account") {
            return None;
        }
        let available = fields.nth(1)?.trim();
        BigDecimal::from_str(available).ok().map(|v| round2(&v))
    })
}

/// Balance and B2B results are not tied to a payout, so a missing
/// `TransactionID` is tolerated.
pub fn parse_header_lenient(payload: &Value) -> Result<ResultHeader, CallbackError> {
    match parse_header(payload) {
        Err(CallbackError::MissingField("TransactionID")) => {
            let result = payload.get("Result").ok_or(CallbackError::MissingResult)?;
            Ok(ResultHeader {
                reference: text(result.get("ConversationID")).unwrap_or_default(),
                transaction_id: None,
                result_code: 0,
                result_desc: text(result.get("ResultDesc")).unwrap_or_default(),
            })
        }
        other => other,
    }
}

fn result_parameters(payload: &Value) -> Vec<&Value> {
    match payload.pointer("/Result/ResultParameters/ResultParameter") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

/// Value for the key at `index` in `keys`. Falls back to position `index`
/// only when the entry there carries no `Key` of its own.
fn param<'a>(params: &[&'a Value], keys: &[&str], index: usize) -> Option<&'a Value> {
    let key = keys.get(index)?;
    params
        .iter()
        .copied()
        .find(|p| p.get("Key").and_then(Value::as_str) == Some(*key))
        .or_else(|| params.get(index).copied().filter(|p| p.get("Key").is_none()))
        .and_then(|p| p.get("Value"))
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(value: &Value) -> Option<BigDecimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    BigDecimal::from_str(&raw).ok().map(|v| round2(&v))
}
