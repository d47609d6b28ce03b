//! Per-account bearer token cache.
//!
//! A slot holds at most one token with its absolute expiry. Callers that
//! find the slot empty or stale refresh it while holding the slot's async
//! lock, so concurrent callers of one account wait for a single refresh
//! instead of each issuing their own auth call.

use crate::gateway::response::TokenGrant;
use crate::gateway::GatewayError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct BearerToken {
    value: String,
    expires_at: Instant,
}

impl BearerToken {
    fn is_fresh(&self, margin: Duration) -> bool {
        Instant::now()
            .checked_add(margin)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

/// Cached bearer token of one gateway account.
#[derive(Debug)]
pub struct TokenSlot {
    token: Mutex<Option<BearerToken>>,
    refresh_margin: Duration,
    refreshes: AtomicU64,
}

impl TokenSlot {
    /// Create an empty slot. Tokens are treated as expired `refresh_margin`
    /// before their stated expiry.
    #[must_use]
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            token: Mutex::new(None),
            refresh_margin,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached token, or run `fetch` to obtain a new one.
    ///
    /// # Errors
    ///
    /// Propagates the error of `fetch`; the slot stays empty in that case.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant, GatewayError>>,
    {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh(self.refresh_margin)) {
            return Ok(token.value.clone());
        }

        let grant = fetch().await?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        debug!(ttl_secs = grant.expires_in.as_secs(), "bearer token refreshed");

        let now = Instant::now();
        // an unrepresentable expiry leaves the token stale on arrival
        let token = BearerToken {
            value: grant.access_token,
            expires_at: now.checked_add(grant.expires_in).unwrap_or(now),
        };
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token, forcing the next caller to re-authenticate.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    /// Number of successful refreshes since creation.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}
