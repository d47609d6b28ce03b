//! PIX gateway access across several redundant accounts.
//!
//! Each configured account has its own client credentials and its own
//! bearer token. The [`AccountClientPool`] owns one [`AccountClient`] per
//! usable account and exposes the two data calls the engine needs:
//!
//! - `create_quote`: `POST /pix/qrcodes`, issues a QR code
//! - `get_status`: `GET /pix/qrcodes/{reference_code}`, pulls status
//!
//! Tokens come from `POST /auth/generate_token` (client-credentials grant
//! over Basic authentication) and are refreshed lazily, one refresh per
//! account at a time.

mod client;
mod pool;
mod response;
mod token;

pub use client::{AccountClient, Credentials};
pub use pool::AccountClientPool;
pub use response::{parse_timestamp, QuoteResult, RawStatus, TokenGrant};
pub use token::TokenSlot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a configured gateway account (1-based, as configured).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountIndex(pub u16);

impl fmt::Display for AccountIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials or rejected token.
    Auth,
    /// Network failure, timeout or 5xx.
    Transient,
    /// 404: the account does not know this payment.
    NotFound,
    /// Any other 4xx.
    Validation,
    /// The account is enabled but cannot be used as configured.
    Configuration,
    /// The response body matched none of the known shapes.
    UnrecognizedShape,
}

/// Failure of one call against one gateway account.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Bad credentials or rejected token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout or 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The account does not know the payment.
    #[error("not found: {0}")]
    NotFound(String),

    /// The gateway rejected the request.
    #[error("rejected with status {status}: {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// The account cannot be used as configured.
    #[error("account misconfigured: {0}")]
    Configuration(String),

    /// The response body matched none of the known shapes.
    #[error("unrecognized response shape: {0}")]
    UnrecognizedShape(String),
}

impl GatewayError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Transient(_) => ErrorKind::Transient,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::UnrecognizedShape(_) => ErrorKind::UnrecognizedShape,
        }
    }
}

/// Parameters for issuing a QR code.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest {
    /// Amount to charge, in cents.
    pub value_cents: i64,
    /// Seconds until the QR code expires.
    #[serde(rename = "expiration_time")]
    pub expiration_secs: u64,
    /// Free-form data echoed back by the gateway.
    pub metadata: serde_json::Value,
}

/// The set of gateway accounts the engine can talk to.
///
/// Implemented by [`AccountClientPool`]; tests substitute scripted fakes.
#[async_trait]
pub trait GatewayAccounts: Send + Sync {
    /// Usable accounts in fixed, deterministic order.
    fn rotation(&self) -> Vec<AccountIndex>;

    /// Issue a QR code on `account`.
    async fn create_quote(
        &self,
        account: AccountIndex,
        request: &QuoteRequest,
    ) -> Result<QuoteResult, GatewayError>;

    /// Pull the status of `reference_code` from `account`.
    async fn get_status(
        &self,
        account: AccountIndex,
        reference_code: &str,
    ) -> Result<RawStatus, GatewayError>;
}
