//! Service event system.

use crate::gateway::AccountIndex;
use crate::payment::{CanonicalStatus, OwnerId, PaymentId};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

/// Events emitted by the reconciliation engine.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Service has started successfully.
    Started,

    /// Service is shutting down.
    ShuttingDown,

    /// A payment moved to a new canonical status.
    StatusChanged {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Previous status.
        from: CanonicalStatus,
        /// New status.
        to: CanonicalStatus,
    },

    /// A wallet was credited for a paid payment.
    PaymentCredited {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Credited owner.
        owner_id: OwnerId,
        /// Amount added to the balance.
        amount: Decimal,
    },

    /// A payment reached `paid` but its wallet could not be credited.
    CreditFailed {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Failure description.
        message: String,
    },

    /// A payment's account affinity was rewritten.
    AffinityChanged {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Account that answered.
        account: AccountIndex,
    },

    /// An inbound webhook failed verification.
    WebhookRejected {
        /// Reference code claimed by the payload, if parseable.
        reference_code: Option<String>,
        /// Rejection reason.
        reason: String,
    },

    /// A synchronisation pass over one owner finished.
    SyncCompleted {
        /// Owner whose payments were reconciled.
        owner_id: OwnerId,
        /// Payments whose status changed.
        updated: usize,
        /// Payments left as they were.
        unchanged: usize,
        /// Payments that could not be reconciled.
        errored: usize,
    },
}

/// Channel for receiving service events.
pub type ServiceEventsChannel = broadcast::Receiver<ServiceEvent>;

/// Sender for service events.
pub type ServiceEventsSender = broadcast::Sender<ServiceEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServiceEventsSender, ServiceEventsChannel) {
    broadcast::channel(256)
}
