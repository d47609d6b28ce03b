//! Push path: verified webhook → normalised status → ledger.

use crate::error::Error;
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::gateway::parse_timestamp;
use crate::payment::{
    normalize, ApplyResult, DeliveryCache, DeliveryKey, LedgerService, PaymentId, PaymentStore,
};
use crate::webhook::signature::{verify, VerificationResult, WebhookPayload};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Verified and applied to the payment.
    Applied {
        /// Local payment id.
        payment_id: PaymentId,
        /// Ledger result.
        result: ApplyResult,
    },
    /// Identical delivery was applied before.
    Duplicate,
    /// Verified `paid`, status recorded, but the owner has no wallet.
    PaidWithoutCredit {
        /// Local payment id.
        payment_id: PaymentId,
    },
    /// Notification kind this service does not process.
    Ignored {
        /// The `notification_type` received.
        kind: String,
    },
    /// Body is not a valid notification.
    Malformed(String),
    /// Digest verification failed.
    Unauthorized(String),
    /// No local payment with this reference code.
    UnknownPayment(String),
    /// Internal failure; the gateway should redeliver.
    Failed(String),
}

impl WebhookOutcome {
    /// HTTP status code to answer the gateway with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Applied { .. }
            | Self::Duplicate
            | Self::PaidWithoutCredit { .. }
            | Self::Ignored { .. } => 200,
            Self::Malformed(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::UnknownPayment(_) => 404,
            Self::Failed(_) => 500,
        }
    }
}

/// Processes inbound gateway notifications.
pub struct WebhookProcessor {
    secret: String,
    store: Arc<dyn PaymentStore>,
    ledger: Arc<LedgerService>,
    deliveries: DeliveryCache,
    events: ServiceEventsSender,
}

impl WebhookProcessor {
    /// Create a processor verifying against `secret`.
    #[must_use]
    pub fn new(
        secret: String,
        store: Arc<dyn PaymentStore>,
        ledger: Arc<LedgerService>,
        deliveries: DeliveryCache,
        events: ServiceEventsSender,
    ) -> Self {
        Self {
            secret,
            store,
            ledger,
            deliveries,
            events,
        }
    }

    /// Applied-delivery cache statistics.
    #[must_use]
    pub fn delivery_stats(&self) -> crate::payment::CacheStats {
        self.deliveries.stats()
    }

    /// Handle one raw webhook body.
    ///
    /// Nothing is normalised or credited unless the digest verifies.
    pub async fn process(&self, body: &[u8]) -> WebhookOutcome {
        let payload = match WebhookPayload::parse(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("rejecting malformed webhook: {e}");
                return WebhookOutcome::Malformed(e.to_string());
            }
        };

        let notification = match (verify(&payload, &self.secret), payload) {
            (VerificationResult::Valid, WebhookPayload::Notification(n)) => n,
            (VerificationResult::Invalid(reason), payload) => {
                warn!(
                    reference_code = payload.reference_code().unwrap_or("-"),
                    %reason,
                    "webhook signature rejected"
                );
                let _ = self.events.send(ServiceEvent::WebhookRejected {
                    reference_code: payload.reference_code().map(str::to_string),
                    reason: reason.clone(),
                });
                return WebhookOutcome::Unauthorized(reason);
            }
            (_, WebhookPayload::Unrecognized { kind }) => {
                debug!(%kind, "ignoring webhook of unhandled kind");
                return WebhookOutcome::Ignored { kind };
            }
            (VerificationResult::Ignored, WebhookPayload::Notification(n)) => {
                return WebhookOutcome::Ignored {
                    kind: n.kind.as_str().to_string(),
                };
            }
        };

        let message = &notification.message;
        let status = normalize(message.status.as_deref());
        let key = DeliveryKey::new(&message.reference_code, status, &notification.digest);
        if self.deliveries.contains(&key) {
            debug!(reference_code = %message.reference_code, "duplicate webhook delivery");
            return WebhookOutcome::Duplicate;
        }

        let record = match self.store.find_by_reference(&message.reference_code).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(reference_code = %message.reference_code, "webhook for unknown payment");
                return WebhookOutcome::UnknownPayment(message.reference_code.clone());
            }
            Err(e) => {
                error!(reference_code = %message.reference_code, "payment lookup failed: {e}");
                return WebhookOutcome::Failed(e.to_string());
            }
        };

        if record.amount_cents() != Some(message.value_cents) {
            warn!(
                payment_id = %record.id,
                expected_cents = ?record.amount_cents(),
                reported_cents = message.value_cents,
                "webhook amount differs from local record"
            );
        }

        let paid_at = message.payment_date.as_deref().and_then(parse_timestamp);
        info!(
            payment_id = %record.id,
            kind = notification.kind.as_str(),
            %status,
            "applying verified webhook"
        );

        match self.ledger.apply_transition(record.id, status, paid_at).await {
            Ok(result) => {
                self.deliveries.insert(key);
                WebhookOutcome::Applied {
                    payment_id: record.id,
                    result,
                }
            }
            Err(Error::OwnerNotFound { payment_id, .. }) => {
                WebhookOutcome::PaidWithoutCredit { payment_id }
            }
            Err(Error::PaymentNotFound(_)) => {
                warn!(payment_id = %record.id, "payment vanished before the webhook was applied");
                WebhookOutcome::UnknownPayment(message.reference_code.clone())
            }
            Err(e) => {
                error!(payment_id = %record.id, "webhook apply failed: {e}");
                WebhookOutcome::Failed(e.to_string())
            }
        }
    }
}
