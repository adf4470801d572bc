use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::money::{from_f64, is_positive, is_whole, round2};

pub const AMOUNT_INPUT_MAX_LEN: usize = 32;
pub const PHONE_INPUT_MAX_LEN: usize = 20;

/// Safaricom subscriber numbers: `2547XXXXXXXX` / `2541XXXXXXXX`.
const INTERNATIONAL_PREFIX: &str = "254";
const SUBSCRIBER_DIGITS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Amounts arrive from mobile clients either as JSON numbers or as strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Positive whole-shilling amount, carried at two decimals. The gateway only
/// moves whole shillings, so a fractional amount is refused rather than
/// rounded into a payout that differs from the debit.
pub fn parse_amount(input: &AmountInput) -> Result<BigDecimal, ValidationError> {
    let amount = match input {
        AmountInput::Number(n) => from_f64(*n).ok_or_else(|| ValidationError::new("amount", "must be a number"))?,
        AmountInput::Text(text) => {
            let text = sanitize_string(text);
            validate_required("amount", &text)?;
            validate_max_len("amount", &text, AMOUNT_INPUT_MAX_LEN)?;
            BigDecimal::from_str(&text).map_err(|_| ValidationError::new("amount", "must be a number"))?
        }
    };

    if !is_positive(&amount) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }
    if !is_whole(&amount) {
        return Err(ValidationError::new("amount", "must be a whole number of shillings"));
    }

    Ok(round2(&amount))
}

/// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `7XXXXXXXX`, `+2547XXXXXXXX` and
/// `2547XXXXXXXX`, returning the `2547XXXXXXXX` form the gateway expects.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();
    validate_required("phone", &cleaned)?;
    validate_max_len("phone", &cleaned, PHONE_INPUT_MAX_LEN)?;

    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }

    let subscriber = if let Some(rest) = digits.strip_prefix(INTERNATIONAL_PREFIX) {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits
    };

    if subscriber.len() != SUBSCRIBER_DIGITS || !(subscriber.starts_with('7') || subscriber.starts_with('1')) {
        return Err(ValidationError::new("phone", "must be a valid Kenyan mobile number"));
    }

    Ok(format!("{}{}", INTERNATIONAL_PREFIX, subscriber))
}

/// `2547XXXXXXXX` back to the local `07XXXXXXXX` form used in messages.
pub fn display_phone(normalized: &str) -> String {
    let subscriber = normalized
        .get(normalized.len().saturating_sub(SUBSCRIBER_DIGITS)..)
        .unwrap_or(normalized);
    format!("0{}", subscriber)
}
