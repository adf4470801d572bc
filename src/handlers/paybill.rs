use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::error::AppError;
use crate::AppState;

/// Last recorded balance. A fresh query is started on every read and lands
/// through the balance callback.
pub async fn balance(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let latest = state.paybill.latest().await?;

    let refresh_requested = match state.paybill.refresh().await {
        Ok(ack) => ack.accepted,
        Err(e) => {
            tracing::warn!(error = %e, "balance refresh failed");
            false
        }
    };

    Ok(Json(json!({
        "status": "success",
        "data": latest,
        "refresh_requested": refresh_requested,
    })))
}
