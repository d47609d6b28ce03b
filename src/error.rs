//! Error types for pix-reconcile.

use crate::gateway::GatewayError;
use crate::payment::{OwnerId, PaymentId};
use crate::reconcile::ResolveFailure;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pix-reconcile.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single gateway call failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Every configured account failed to answer a status query.
    #[error("reconciliation failed: {0}")]
    Resolve(#[from] ResolveFailure),

    /// Payment record store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Structurally invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// No local payment record for the given id or reference code.
    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    /// The payment was marked paid but its owner has no wallet.
    #[error("owner {owner_id} of payment {payment_id} not found; status recorded without credit")]
    OwnerNotFound {
        /// Payment whose status was recorded.
        payment_id: PaymentId,
        /// Owner that could not be resolved.
        owner_id: OwnerId,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Service is shutting down.
    #[error("service is shutting down")]
    ShuttingDown,
}
