//! Inbound gateway results. The gateway redelivers anything that is not a
//! 200, so processed, duplicate and malformed callbacks are all acknowledged.
//! A storage failure or a reference not yet stored answers 503, which is safe
//! because resolution is idempotent.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::domain::TransactionKind;
use crate::services::CallbackOutcome;
use crate::AppState;

pub async fn loan_result(State(state): State<AppState>, body: Bytes) -> Response {
    payout_result(&state, TransactionKind::Loan, &body).await
}

pub async fn airtime_result(State(state): State<AppState>, body: Bytes) -> Response {
    payout_result(&state, TransactionKind::AirtimePurchase, &body).await
}

pub async fn transfer_result(State(state): State<AppState>, body: Bytes) -> Response {
    payout_result(&state, TransactionKind::MoneyTransfer, &body).await
}

pub async fn balance_result(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(payload) = parse_body(&body) else {
        return acknowledge(&CallbackOutcome::Invalid("body is not JSON".into()));
    };
    match state.paybill.handle_balance_callback(&payload).await {
        Ok(outcome) => acknowledge(&outcome),
        Err(e) => retry_later(&e.to_string()),
    }
}

pub async fn remittance_result(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome = match parse_body(&body) {
        Some(payload) => state.settlement.handle_remittance_callback(&payload),
        None => CallbackOutcome::Invalid("body is not JSON".into()),
    };
    acknowledge(&outcome)
}

async fn payout_result(state: &AppState, kind: TransactionKind, body: &[u8]) -> Response {
    let Some(payload) = parse_body(body) else {
        tracing::warn!(kind = %kind, "callback body is not JSON");
        return acknowledge(&CallbackOutcome::Invalid("body is not JSON".into()));
    };
    match state.settlement.handle_payout_callback(kind, &payload).await {
        Ok(CallbackOutcome::UnknownReference) => redeliver("unknown reference"),
        Ok(outcome) => acknowledge(&outcome),
        Err(e) => retry_later(&e.to_string()),
    }
}

fn parse_body(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

fn acknowledge(outcome: &CallbackOutcome) -> Response {
    let desc = match outcome {
        CallbackOutcome::Invalid(_) => "invalid",
        _ => "accepted",
    };
    (StatusCode::OK, Json(json!({"ResultCode": 0, "ResultDesc": desc}))).into_response()
}

fn retry_later(error: &str) -> Response {
    tracing::error!(error = %error, "callback could not be stored; asking gateway to redeliver");
    redeliver("try later")
}

fn redeliver(desc: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"ResultCode": 1, "ResultDesc": desc})),
    )
        .into_response()
}
