use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod fees;

pub use fees::{FeeRule, FeeSchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    pub schedule: String,
    pub max_run_secs: u64,
    pub concurrency: usize,
    pub source_utc_offset_hours: i32,
}

impl SyncConfig {
    pub fn max_run(&self) -> Duration {
        Duration::from_secs(self.max_run_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MpesaConfig {
    pub oauth_url: String,
    pub b2c_url: String,
    pub balance_url: String,
    pub b2b_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub initiator: String,
    pub security_credential: String,
    pub short_code: String,
    pub b2b_short_code: String,
    pub callback_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub source: SourceConfig,
    pub retry: RetryConfig,
    pub token_refresh_margin_secs: u64,
    pub sync: SyncConfig,
    pub mpesa: MpesaConfig,
    pub log_format: LogFormat,
    pub admin_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let retry = RetryConfig {
            max_attempts: parse(&or_default("RETRY_MAX_ATTEMPTS", "3"), "RETRY_MAX_ATTEMPTS")?,
            base_delay_ms: parse(&or_default("RETRY_BASE_DELAY_MS", "1000"), "RETRY_BASE_DELAY_MS")?,
        };
        if retry.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }

        let sync = SyncConfig {
            schedule: or_default("SYNC_SCHEDULE", "0 0 0 * * *"),
            max_run_secs: parse(&or_default("SYNC_MAX_RUN_SECS", "1800"), "SYNC_MAX_RUN_SECS")?,
            concurrency: parse(&or_default("SYNC_CONCURRENCY", "4"), "SYNC_CONCURRENCY")?,
            source_utc_offset_hours: parse(
                &or_default("SOURCE_UTC_OFFSET_HOURS", "3"),
                "SOURCE_UTC_OFFSET_HOURS",
            )?,
        };
        if sync.concurrency == 0 {
            anyhow::bail!("SYNC_CONCURRENCY must be at least 1");
        }
        cron::Schedule::from_str(&sync.schedule)
            .map_err(|e| anyhow::anyhow!("SYNC_SCHEDULE is not a valid cron expression: {}", e))?;

        let config = Config {
            server_port: parse(&or_default("SERVER_PORT", "3000"), "SERVER_PORT")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse(
                &or_default("DATABASE_MAX_CONNECTIONS", "5"),
                "DATABASE_MAX_CONNECTIONS",
            )?,
            source: SourceConfig {
                base_url: required("LEDGER_SOURCE_URL")?,
                username: required("LEDGER_SOURCE_USERNAME")?,
                password: required("LEDGER_SOURCE_PASSWORD")?,
                page_size: parse(&or_default("LEDGER_SOURCE_PAGE_SIZE", "100"), "LEDGER_SOURCE_PAGE_SIZE")?,
                timeout_secs: parse(
                    &or_default("LEDGER_SOURCE_TIMEOUT_SECS", "30"),
                    "LEDGER_SOURCE_TIMEOUT_SECS",
                )?,
            },
            retry,
            token_refresh_margin_secs: parse(
                &or_default("TOKEN_REFRESH_MARGIN_SECS", "60"),
                "TOKEN_REFRESH_MARGIN_SECS",
            )?,
            sync,
            mpesa: MpesaConfig {
                oauth_url: required("MPESA_OAUTH_URL")?,
                b2c_url: required("MPESA_B2C_URL")?,
                balance_url: required("MPESA_BALANCE_URL")?,
                b2b_url: required("MPESA_B2B_URL")?,
                consumer_key: required("MPESA_CONSUMER_KEY")?,
                consumer_secret: required("MPESA_CONSUMER_SECRET")?,
                initiator: required("MPESA_INITIATOR")?,
                security_credential: required("MPESA_SECURITY_CREDENTIAL")?,
                short_code: required("MPESA_SHORT_CODE")?,
                b2b_short_code: required("MPESA_B2B_SHORT_CODE")?,
                callback_base_url: required("CALLBACK_BASE_URL")?,
            },
            log_format: or_default("LOG_FORMAT", "pretty").parse()?,
            admin_api_key: required("ADMIN_API_KEY")?,
        };
        config.validate_urls()?;
        Ok(config)
    }

    fn validate_urls(&self) -> Result<()> {
        let urls = [
            ("LEDGER_SOURCE_URL", &self.source.base_url),
            ("MPESA_OAUTH_URL", &self.mpesa.oauth_url),
            ("MPESA_B2C_URL", &self.mpesa.b2c_url),
            ("MPESA_BALANCE_URL", &self.mpesa.balance_url),
            ("MPESA_B2B_URL", &self.mpesa.b2b_url),
            ("CALLBACK_BASE_URL", &self.mpesa.callback_base_url),
        ];
        for (key, value) in urls {
            url::Url::parse(value).with_context(|| format!("{} is not a valid URL", key))?;
        }
        Ok(())
    }
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
}
