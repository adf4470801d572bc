use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::services::{StopSignal, SyncService, WalletLedger};

#[derive(Parser)]
#[command(name = "kilo-ledger")]
#[command(about = "Kilo Ledger - delivery ingestion and farmer credit settlement", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the sync scheduler (default)
    Serve,

    /// Pull delivery records from the ledger source once
    Sync {
        /// Only sync this farmer, over the current month
        #[arg(long)]
        farmer_code: Option<String>,

        /// Sync every farmer individually over the current month
        #[arg(long, conflicts_with = "farmer_code")]
        all_farmers: bool,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Wallet maintenance commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Zero every wallet for a new period
    Reset,

    /// Recompute weight and earnings from stored deliveries
    Recalculate {
        #[arg(value_name = "FARMER_CODE")]
        farmer_code: String,
    },
}

pub async fn handle_sync(
    sync: &SyncService,
    config: &Config,
    farmer_code: Option<&str>,
    all_farmers: bool,
) -> anyhow::Result<()> {
    let stop = StopSignal::never().with_deadline(config.sync.max_run());
    let now = Utc::now();

    if let Some(code) = farmer_code {
        let report = sync.sync_farmer_by_code(code, sync.monthly_window(now), &stop).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if all_farmers {
        let results = sync.sync_all_farmers(sync.monthly_window(now), &stop).await?;
        let mut failures = 0;
        for (code, result) in results {
            match result {
                Ok(report) => println!(
                    "{:<16} applied={} duplicates={} failed={} stopped={:?}",
                    code, report.applied, report.skipped_duplicate, report.failed, report.stopped
                ),
                Err(e) => {
                    failures += 1;
                    println!("{:<16} error: {}", code, e);
                }
            }
        }
        if failures > 0 {
            anyhow::bail!("{} farmer syncs failed", failures);
        }
        return Ok(());
    }

    let report = sync.sync_window(sync.daily_window(now), &stop).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_wallet_reset(ledger: &WalletLedger) -> anyhow::Result<()> {
    let count = ledger.reset_all().await?;
    println!("✓ Reset {} wallets", count);
    Ok(())
}

pub async fn handle_wallet_recalculate(
    ledger: &WalletLedger,
    farmers: &dyn crate::ports::FarmerRepository,
    farmer_code: &str,
) -> anyhow::Result<()> {
    let farmer = farmers
        .find_by_code(farmer_code)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Farmer {} not found", farmer_code))?;
    let wallet = ledger.recalculate(farmer.id).await?;
    println!(
        "✓ Wallet for {} recalculated: weight={} earnings={}",
        farmer_code, wallet.weight, wallet.earnings_amount
    );
    Ok(())
}

pub fn handle_config_show(config: &Config) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Ledger Source: {} (user {})", config.source.base_url, config.source.username);
    println!("  Ledger Source Password: {}", mask_secret(&config.source.password));
    println!("  Page Size: {}", config.source.page_size);
    println!(
        "  Retry: {} attempts, {} ms base delay",
        config.retry.max_attempts, config.retry.base_delay_ms
    );
    println!(
        "  Sync: '{}' (max {} s, concurrency {}, source offset UTC{:+})",
        config.sync.schedule, config.sync.max_run_secs, config.sync.concurrency, config.sync.source_utc_offset_hours
    );
    println!("  M-Pesa Short Code: {}", config.mpesa.short_code);
    println!("  M-Pesa Consumer Secret: {}", mask_secret(&config.mpesa.consumer_secret));
    println!("  Callback Base URL: {}", config.mpesa.callback_base_url);
    println!("  Admin API Key: {}", mask_secret(&config.admin_api_key));

    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(secret: &str) -> String {
    match secret.chars().count() {
        0 => "(unset)".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => {
            let tail: String = secret.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{}", tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://kilo:hunter2@db:5432/kilo"),
            "postgres://kilo:****@db:5432/kilo"
        );
        assert_eq!(mask_password("postgres://db/kilo"), "postgres://db/kilo");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(unset)");
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("supersecret"), "****et");
    }

    #[test]
    fn test_cli_parses_sync_flags() {
        let cli = Cli::try_parse_from(["kilo-ledger", "sync", "--farmer-code", "F-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Sync { farmer_code: Some(ref c), all_farmers: false }) if c == "F-1"
        ));

        let cli = Cli::try_parse_from(["kilo-ledger", "wallet", "recalculate", "F-2"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Wallet(WalletCommands::Recalculate { ref farmer_code })) if farmer_code == "F-2"
        ));
    }
}
