pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod source;
pub mod startup;
pub mod validation;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::ports::HealthProbe;
use crate::services::{PaybillService, SettlementService, SyncService, WalletLedger};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<WalletLedger>,
    pub settlement: Arc<SettlementService>,
    pub paybill: Arc<PaybillService>,
    pub sync: Arc<SyncService>,
    pub health: Arc<dyn HealthProbe>,
    pub admin_api_key: String,
    pub sync_max_run: Duration,
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/sync", post(handlers::admin::trigger_sync))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions/loan", post(handlers::transactions::request_loan))
        .route("/transactions/airtime", post(handlers::transactions::request_airtime))
        .route("/transactions/transfer", post(handlers::transactions::request_transfer))
        .route("/callbacks/b2c/loan", post(handlers::callbacks::loan_result))
        .route("/callbacks/b2c/airtime", post(handlers::callbacks::airtime_result))
        .route("/callbacks/b2c/transfer", post(handlers::callbacks::transfer_result))
        .route("/callbacks/b2c/balance", post(handlers::callbacks::balance_result))
        .route("/callbacks/b2b", post(handlers::callbacks::remittance_result))
        .route("/wallets/me", get(handlers::wallets::my_wallet))
        .route("/paybill/balance", get(handlers::paybill::balance))
        .merge(admin)
        .layer(axum_middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}
