//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use pix_reconcile::config::{default_config_path, ServiceConfig};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;

/// PIX payment reconciliation service.
#[derive(Parser, Debug)]
#[command(name = "pix-reconcile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on for webhooks and dashboard calls.
    #[arg(long, short, env = "PIX_BIND_ADDR")]
    pub bind: Option<SocketAddr>,

    /// Shared secret used to verify gateway webhooks.
    #[arg(long, env = "PIX_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Fraction of each paid amount credited to the owner.
    #[arg(long, env = "PIX_PAYOUT_RATE")]
    pub payout_rate: Option<Decimal>,

    /// Gateway API base URL.
    #[arg(long, env = "PIX_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Seconds between background sync passes (0 disables).
    #[arg(long, env = "PIX_SYNC_INTERVAL")]
    pub sync_interval: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "PIX_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a ServiceConfig.
    ///
    /// Without `--config`, the default config path is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServiceConfig> {
        let path = self
            .config
            .or_else(|| Some(default_config_path()).filter(|p| p.exists()));
        let mut config = match path {
            Some(ref path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(secret) = self.webhook_secret {
            config.webhook.secret = secret;
        }
        if let Some(rate) = self.payout_rate {
            config.ledger.payout_rate = rate;
        }
        if let Some(url) = self.gateway_url {
            config.gateway.base_url = url;
        }
        if let Some(interval) = self.sync_interval {
            config.sync.interval_secs = interval;
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}
