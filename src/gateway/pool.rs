//! The pool of configured gateway accounts.

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::gateway::client::AccountClient;
use crate::gateway::response::{QuoteResult, RawStatus};
use crate::gateway::{AccountIndex, GatewayAccounts, GatewayError, QuoteRequest};
use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug)]
enum AccountSlot {
    Ready(AccountClient),
    Misconfigured { index: AccountIndex, reason: String },
    Disabled { index: AccountIndex },
}

impl AccountSlot {
    fn index(&self) -> AccountIndex {
        match self {
            Self::Ready(client) => client.index(),
            Self::Misconfigured { index, .. } | Self::Disabled { index } => *index,
        }
    }
}

/// One client per configured account, sharing a single HTTP connection pool.
///
/// Constructed once at startup and shared by reference; each client keeps
/// its own token cache.
#[derive(Debug)]
pub struct AccountClientPool {
    slots: Vec<AccountSlot>,
}

impl AccountClientPool {
    /// Build the pool from configuration.
    ///
    /// Enabled accounts without usable credentials are kept out of the
    /// rotation and answer every call with [`GatewayError::Configuration`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pix-reconcile/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let slots: Vec<AccountSlot> = config
            .accounts
            .iter()
            .map(|account| {
                let index = account.account_index();
                if !account.enabled {
                    return AccountSlot::Disabled { index };
                }
                match account.resolve_credentials() {
                    Ok(credentials) => AccountSlot::Ready(AccountClient::new(
                        index,
                        credentials,
                        config,
                        http.clone(),
                    )),
                    Err(reason) => {
                        warn!(account = %index, %reason, "gateway account excluded from rotation");
                        AccountSlot::Misconfigured { index, reason }
                    }
                }
            })
            .collect();

        let ready = slots
            .iter()
            .filter(|s| matches!(s, AccountSlot::Ready(_)))
            .count();
        info!(
            "Gateway account pool initialized ({} configured, {} usable)",
            slots.len(),
            ready
        );

        Ok(Self { slots })
    }

    /// Look up the client of a usable account.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Configuration`] if the account is unknown, disabled
    /// or misconfigured.
    pub fn client(&self, index: AccountIndex) -> std::result::Result<&AccountClient, GatewayError> {
        match self.slots.iter().find(|s| s.index() == index) {
            Some(AccountSlot::Ready(client)) => Ok(client),
            Some(AccountSlot::Misconfigured { reason, .. }) => {
                Err(GatewayError::Configuration(reason.clone()))
            }
            Some(AccountSlot::Disabled { .. }) => Err(GatewayError::Configuration(format!(
                "account {index} is disabled"
            ))),
            None => Err(GatewayError::Configuration(format!(
                "account {index} is not configured"
            ))),
        }
    }

    /// Number of accounts in the rotation.
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.rotation().len()
    }
}

#[async_trait]
impl GatewayAccounts for AccountClientPool {
    fn rotation(&self) -> Vec<AccountIndex> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                AccountSlot::Ready(client) => Some(client.index()),
                _ => None,
            })
            .collect()
    }

    async fn create_quote(
        &self,
        account: AccountIndex,
        request: &QuoteRequest,
    ) -> std::result::Result<QuoteResult, GatewayError> {
        self.client(account)?.create_quote(request).await
    }

    async fn get_status(
        &self,
        account: AccountIndex,
        reference_code: &str,
    ) -> std::result::Result<RawStatus, GatewayError> {
        self.client(account)?.get_status(reference_code).await
    }
}
