//! # pix-reconcile
//!
//! PIX payment reconciliation engine.
//!
//! A payment's final state can reach this service through two independent,
//! unordered channels: a webhook pushed by the gateway, and a status query
//! pulled from one of several redundant gateway accounts. Whichever arrives
//! first, and however often either repeats, the owner's wallet is credited
//! exactly once.
//!
//! This crate provides:
//! - MD5 webhook signature verification ([`webhook`])
//! - Normalisation of the gateway status vocabulary ([`payment::normalize`])
//! - A per-account client pool with single-flight token refresh ([`gateway`])
//! - Multi-account resolution with affinity and fallback ([`reconcile`])
//! - The compare-and-set crediting guard ([`payment::LedgerService`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use pix_reconcile::{ServiceBuilder, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ServiceConfig::default();
//!     config.webhook.secret = "shared-secret".to_string();
//!     let mut service = ServiceBuilder::new(config).build().await?;
//!     service.run().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod payment;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod webhook;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use event::{ServiceEvent, ServiceEventsChannel};
pub use gateway::{AccountClientPool, AccountIndex, GatewayAccounts, GatewayError};
pub use payment::{
    normalize, ApplyResult, CanonicalStatus, InMemoryStore, LedgerService, PaymentRecord,
    PaymentStore, WalletTransaction,
};
pub use reconcile::{PaymentIssuer, Resolver, SyncEngine, SyncReport};
pub use service::{RunningService, ServiceBuilder};
pub use webhook::{verify, VerificationResult, WebhookOutcome, WebhookPayload, WebhookProcessor};
