//! Wires configuration, the Postgres adapters and the remote clients into
//! the services the HTTP layer and the CLI share.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::postgres::{
    PostgresDeliveryRepository, PostgresFarmerRepository, PostgresHealthProbe, PostgresPaybillRepository,
    PostgresSettlementRepository, PostgresWalletRepository,
};
use crate::adapters::LogNotifier;
use crate::config::{Config, FeeSchedule};
use crate::domain::window::offset_hours;
use crate::gateway::MpesaGateway;
use crate::services::{IngestionPipeline, PaybillService, SettlementService, SyncService, WalletLedger};
use crate::source::{RetryPolicy, SourceClient, TokenCache};
use crate::AppState;

pub struct Services {
    pub ledger: Arc<WalletLedger>,
    pub sync: Arc<SyncService>,
    pub settlement: Arc<SettlementService>,
    pub paybill: Arc<PaybillService>,
    pub health: Arc<PostgresHealthProbe>,
}

impl Services {
    pub fn build(config: &Config, pool: PgPool) -> Result<Self> {
        let source_offset = offset_hours(config.sync.source_utc_offset_hours)
            .context("SOURCE_UTC_OFFSET_HOURS is out of range")?;
        let retry = RetryPolicy::from_config(&config.retry);

        let farmers = Arc::new(PostgresFarmerRepository::new(pool.clone()));
        let wallets = Arc::new(PostgresWalletRepository::new(pool.clone()));
        let deliveries = Arc::new(PostgresDeliveryRepository::new(pool.clone()));
        let settlements = Arc::new(PostgresSettlementRepository::new(pool.clone()));
        let paybill = Arc::new(PostgresPaybillRepository::new(pool.clone()));

        let ledger = Arc::new(WalletLedger::new(wallets, deliveries.clone(), retry));

        let tokens = Arc::new(TokenCache::new(Duration::from_secs(config.token_refresh_margin_secs)));
        let source = Arc::new(SourceClient::new(&config.source, tokens, retry));
        let pipeline = Arc::new(IngestionPipeline::new(farmers.clone(), ledger.clone(), source_offset));
        let sync = Arc::new(SyncService::new(
            source,
            pipeline,
            farmers.clone(),
            deliveries,
            config.source.page_size,
            config.sync.concurrency,
            source_offset,
        ));

        let gateway = Arc::new(MpesaGateway::new(config.mpesa.clone()));
        let settlement = Arc::new(SettlementService::new(
            farmers,
            settlements,
            ledger.clone(),
            gateway.clone(),
            Arc::new(LogNotifier),
            FeeSchedule::standard(),
            retry,
            config.mpesa.callback_base_url.clone(),
        ));
        let paybill = Arc::new(PaybillService::new(gateway, paybill));

        Ok(Self {
            ledger,
            sync,
            settlement,
            paybill,
            health: Arc::new(PostgresHealthProbe::new(pool)),
        })
    }

    pub fn app_state(&self, config: &Config) -> AppState {
        AppState {
            ledger: self.ledger.clone(),
            settlement: self.settlement.clone(),
            paybill: self.paybill.clone(),
            sync: self.sync.clone(),
            health: self.health.clone(),
            admin_api_key: config.admin_api_key.clone(),
            sync_max_run: config.sync.max_run(),
        }
    }
}

pub fn sync_schedule(config: &Config) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&config.sync.schedule)
        .map_err(|e| anyhow::anyhow!("SYNC_SCHEDULE is not a valid cron expression: {}", e))
}
