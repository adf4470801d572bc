use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::domain::TransactionKind;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedFarmer;
use crate::services::SettlementRequest;
use crate::validation::{normalize_phone, parse_amount, AmountInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub amount: AmountInput,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub phone: String,
    pub amount: AmountInput,
}

pub async fn request_loan(
    State(state): State<AppState>,
    AuthenticatedFarmer(farmer_id): AuthenticatedFarmer,
    Json(payload): Json<LoanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = SettlementRequest {
        kind: TransactionKind::Loan,
        amount: parse_amount(&payload.amount)?,
        recipient_phone: None,
    };
    submit(&state, farmer_id, request).await
}

pub async fn request_airtime(
    State(state): State<AppState>,
    AuthenticatedFarmer(farmer_id): AuthenticatedFarmer,
    Json(payload): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = payout(TransactionKind::AirtimePurchase, &payload)?;
    submit(&state, farmer_id, request).await
}

pub async fn request_transfer(
    State(state): State<AppState>,
    AuthenticatedFarmer(farmer_id): AuthenticatedFarmer,
    Json(payload): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = payout(TransactionKind::MoneyTransfer, &payload)?;
    submit(&state, farmer_id, request).await
}

fn payout(kind: TransactionKind, payload: &PayoutRequest) -> Result<SettlementRequest, AppError> {
    Ok(SettlementRequest {
        kind,
        amount: parse_amount(&payload.amount)?,
        recipient_phone: Some(normalize_phone(&payload.phone)?),
    })
}

async fn submit(
    state: &AppState,
    farmer_id: uuid::Uuid,
    request: SettlementRequest,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.settlement.request(farmer_id, request).await?;
    Ok(Json(json!({
        "status": "success",
        "message": receipt.message,
        "data": receipt,
    })))
}
