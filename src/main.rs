use clap::Parser;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kilo_ledger::adapters::postgres::PostgresFarmerRepository;
use kilo_ledger::cli::{self, Cli, Commands, DbCommands, WalletCommands};
use kilo_ledger::config::{Config, LogFormat};
use kilo_ledger::startup::{sync_schedule, Services};
use kilo_ledger::{create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Sync {
            farmer_code,
            all_farmers,
        } => {
            let pool = db::create_pool(&config).await?;
            let services = Services::build(&config, pool)?;
            cli::handle_sync(&services.sync, &config, farmer_code.as_deref(), all_farmers).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Wallet(command) => {
            let pool = db::create_pool(&config).await?;
            let services = Services::build(&config, pool.clone())?;
            match command {
                WalletCommands::Reset => cli::handle_wallet_reset(&services.ledger).await,
                WalletCommands::Recalculate { farmer_code } => {
                    let farmers = PostgresFarmerRepository::new(pool);
                    cli::handle_wallet_recalculate(&services.ledger, &farmers, &farmer_code).await
                }
            }
        }
        Commands::Config => cli::handle_config_show(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let services = Services::build(&config, pool)?;
    let app = create_app(services.app_state(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(services.sync.clone().run_scheduler(
        sync_schedule(&config)?,
        config.sync.max_run(),
        shutdown_rx,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "sync scheduler task failed");
    }

    Ok(())
}
