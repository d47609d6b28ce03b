//! Configuration for pix-reconcile.

use crate::gateway::{AccountIndex, Credentials};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP surface listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Webhook verification configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Wallet crediting configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Gateway accounts and timeouts.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Background synchronisation.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret appended to the digest input.
    #[serde(default)]
    pub secret: String,

    /// Capacity of the applied-delivery cache.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

/// Wallet crediting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Fraction of the paid amount credited to the owner.
    #[serde(default = "default_payout_rate")]
    pub payout_rate: Decimal,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for token issuance, in seconds.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,

    /// Timeout for QR code and status calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Refresh tokens this many seconds before they expire.
    #[serde(default = "default_refresh_margin")]
    pub token_refresh_margin_secs: u64,

    /// Lifetime requested for new QR codes, in seconds.
    #[serde(default = "default_quote_expiration")]
    pub quote_expiration_secs: u64,

    /// Redundant accounts, tried in this order.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// One gateway account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account index, unique across the list.
    pub index: u16,

    /// OAuth client id. Falls back to `PIX_ACCOUNT_<index>_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret. Falls back to `PIX_ACCOUNT_<index>_CLIENT_SECRET`.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,

    /// Disabled accounts are never queried.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Background synchronisation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic syncs of all unsettled payments (0 = off).
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Payments of one owner reconciled in parallel.
    #[serde(default = "default_sync_concurrency")]
    pub concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_level: default_log_level(),
            webhook: WebhookConfig::default(),
            ledger: LedgerConfig::default(),
            gateway: GatewayConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payout_rate: default_payout_rate(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_timeout_secs: default_auth_timeout(),
            request_timeout_secs: default_request_timeout(),
            token_refresh_margin_secs: default_refresh_margin(),
            quote_expiration_secs: default_quote_expiration(),
            accounts: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            concurrency: default_sync_concurrency(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.pix-gateway.example/v1".to_string()
}

const fn default_dedup_capacity() -> usize {
    10_000
}

fn default_payout_rate() -> Decimal {
    Decimal::new(8, 1)
}

const fn default_auth_timeout() -> u64 {
    30
}

const fn default_request_timeout() -> u64 {
    10
}

const fn default_refresh_margin() -> u64 {
    30
}

const fn default_quote_expiration() -> u64 {
    3600
}

const fn default_sync_interval() -> u64 {
    300
}

const fn default_sync_concurrency() -> usize {
    4
}

const fn default_true() -> bool {
    true
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "pix-reconcile")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("pix-reconcile.toml"))
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file. Client secrets are not written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the configuration for values the service cannot run with.
    ///
    /// Accounts with missing credentials are not rejected here; the pool
    /// excludes them individually.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] describing the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        if self.webhook.secret.trim().is_empty() {
            return Err(crate::Error::Config("webhook.secret must be set".to_string()));
        }
        let rate = self.ledger.payout_rate;
        if rate <= Decimal::ZERO || rate > Decimal::ONE {
            return Err(crate::Error::Config(format!(
                "ledger.payout_rate must be in (0, 1], got {rate}"
            )));
        }
        if self.gateway.auth_timeout_secs == 0 || self.gateway.request_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "gateway timeouts must be non-zero".to_string(),
            ));
        }
        if self.sync.concurrency == 0 {
            return Err(crate::Error::Config(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for account in &self.gateway.accounts {
            if !seen.insert(account.index) {
                return Err(crate::Error::Config(format!(
                    "duplicate gateway account index {}",
                    account.index
                )));
            }
        }
        Ok(())
    }
}

impl GatewayConfig {
    /// Token issuance timeout.
    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Data call timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token refresh margin.
    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

impl AccountConfig {
    /// Account index as used by the pool.
    #[must_use]
    pub fn account_index(&self) -> AccountIndex {
        AccountIndex(self.index)
    }

    /// Resolve the credential pair, falling back to the environment.
    ///
    /// # Errors
    ///
    /// Returns a description of the missing half if either part is absent.
    pub fn resolve_credentials(&self) -> Result<Credentials, String> {
        let from_env = |suffix: &str| {
            std::env::var(format!("PIX_ACCOUNT_{}_{suffix}", self.index))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        let client_id = self
            .client_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| from_env("CLIENT_ID"))
            .ok_or_else(|| format!("account {} has no client_id", self.index))?;
        let client_secret = self
            .client_secret
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| from_env("CLIENT_SECRET"))
            .ok_or_else(|| format!("account {} has no client_secret", self.index))?;

        Ok(Credentials {
            client_id,
            client_secret,
        })
    }
}
