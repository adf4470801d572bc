use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedFarmer;
use crate::AppState;

pub async fn my_wallet(
    State(state): State<AppState>,
    AuthenticatedFarmer(farmer_id): AuthenticatedFarmer,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.ledger.wallet(farmer_id).await?;
    Ok(Json(json!({"status": "success", "data": wallet})))
}
