use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::services::StopSignal;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    pub farmer_code: Option<String>,
}

/// Runs a sync inline and returns its report. With `farmer_code` the current
/// month is synced for that farmer; otherwise the daily window for everyone.
pub async fn trigger_sync(
    State(state): State<AppState>,
    payload: Option<Json<SyncRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let stop = StopSignal::never().with_deadline(state.sync_max_run);
    let now = Utc::now();

    let report = match request.farmer_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let window = state.sync.monthly_window(now);
            state.sync.sync_farmer_by_code(code, window, &stop).await?
        }
        None => {
            let window = state.sync.daily_window(now);
            state.sync.sync_window(window, &stop).await
        }
    };

    Ok(Json(json!({"status": "success", "data": report})))
}
