//! Ledger crediting service.
//!
//! Both delivery paths (webhook push and status pull) end here. A wallet
//! credit happens only for the caller that moves a payment from a non-paid
//! status to `paid` through the store's compare-and-set; every other caller
//! sees `Unchanged`. The ledger entry that credit produces is the proof that
//! the payment was credited.

use crate::error::{Error, Result};
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::payment::record::{PaymentId, PaymentRecord, WalletTransaction};
use crate::payment::status::CanonicalStatus;
use crate::payment::store::{CreditOutcome, PaymentStore};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How often a lost compare-and-set is re-evaluated before giving up.
const MAX_CAS_ATTEMPTS: usize = 4;

/// Result of applying a canonical status to a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Status moved to `paid` and the wallet was credited.
    Credited {
        /// Status before the transition.
        from: CanonicalStatus,
        /// The ledger entry written.
        transaction: WalletTransaction,
    },
    /// Status changed without a wallet credit.
    Updated {
        /// Status before the transition.
        from: CanonicalStatus,
        /// Status after the transition.
        to: CanonicalStatus,
    },
    /// Nothing changed: same status, or the transition was not allowed.
    Unchanged {
        /// Current persisted status.
        status: CanonicalStatus,
    },
}

impl ApplyResult {
    /// Returns true if the persisted status changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    /// Persisted status after the call.
    #[must_use]
    pub fn status(&self) -> CanonicalStatus {
        match self {
            Self::Credited { .. } => CanonicalStatus::Paid,
            Self::Updated { to, .. } => *to,
            Self::Unchanged { status } => *status,
        }
    }
}

/// Applies canonical status transitions and credits wallets exactly once.
pub struct LedgerService {
    store: Arc<dyn PaymentStore>,
    payout_rate: Decimal,
    events: ServiceEventsSender,
}

impl LedgerService {
    /// Create a ledger service crediting `payout_rate` of each paid amount.
    #[must_use]
    pub fn new(store: Arc<dyn PaymentStore>, payout_rate: Decimal, events: ServiceEventsSender) -> Self {
        Self {
            store,
            payout_rate,
            events,
        }
    }

    /// Amount credited for a payment of `amount_major_units`, rounded to cents.
    #[must_use]
    pub fn credit_amount(&self, amount_major_units: Decimal) -> Decimal {
        (amount_major_units * self.payout_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Apply `new_status` to the payment.
    ///
    /// `paid_at` defaults to now when the payment becomes paid.
    ///
    /// # Errors
    ///
    /// - [`Error::PaymentNotFound`] if the payment does not exist.
    /// - [`Error::OwnerNotFound`] if the payment was marked paid but the
    ///   owner has no wallet. The status change is kept.
    /// - [`Error::Store`] if the status kept changing under us.
    pub async fn apply_transition(
        &self,
        payment_id: PaymentId,
        new_status: CanonicalStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<ApplyResult> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let record = self
                .store
                .get(payment_id)
                .await?
                .ok_or_else(|| Error::PaymentNotFound(payment_id.to_string()))?;
            let current = record.status;

            if !current.can_transition_to(new_status) {
                if current != new_status {
                    debug!(
                        payment_id = %payment_id,
                        current = %current,
                        reported = %new_status,
                        "ignoring transition out of terminal status"
                    );
                }
                return Ok(ApplyResult::Unchanged { status: current });
            }

            let stamp = (new_status == CanonicalStatus::Paid).then(|| paid_at.unwrap_or_else(Utc::now));
            let won = self
                .store
                .compare_and_set_status(payment_id, current, new_status, stamp)
                .await?;
            if !won {
                continue;
            }

            info!(
                payment_id = %payment_id,
                from = %current,
                to = %new_status,
                "payment status changed"
            );
            let _ = self.events.send(ServiceEvent::StatusChanged {
                payment_id,
                from: current,
                to: new_status,
            });

            if new_status != CanonicalStatus::Paid {
                return Ok(ApplyResult::Updated {
                    from: current,
                    to: new_status,
                });
            }
            return self.credit(&record, current).await;
        }

        Err(Error::Store(format!(
            "status of payment {payment_id} kept changing; gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }

    /// Credit the owner of a payment this caller just moved to `paid`.
    async fn credit(&self, record: &PaymentRecord, from: CanonicalStatus) -> Result<ApplyResult> {
        let amount = self.credit_amount(record.amount_major_units);
        let description = format!(
            "PIX payment {} ({} x {})",
            record.reference_code, record.amount_major_units, self.payout_rate
        );

        let outcome = match self
            .store
            .credit_wallet(record.owner_id, amount, description, record.id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(payment_id = %record.id, "wallet credit failed after status was set to paid: {e}");
                let _ = self.events.send(ServiceEvent::CreditFailed {
                    payment_id: record.id,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        match outcome {
            CreditOutcome::Credited(transaction) => {
                info!(
                    payment_id = %record.id,
                    owner_id = %record.owner_id,
                    %amount,
                    balance_after = %transaction.balance_after,
                    "wallet credited"
                );
                let _ = self.events.send(ServiceEvent::PaymentCredited {
                    payment_id: record.id,
                    owner_id: record.owner_id,
                    amount,
                });
                Ok(ApplyResult::Credited { from, transaction })
            }
            CreditOutcome::AlreadyCredited(existing) => {
                warn!(
                    payment_id = %record.id,
                    ledger_entry = %existing.id,
                    "payment re-entered paid but already has a ledger entry; not crediting again"
                );
                Ok(ApplyResult::Updated {
                    from,
                    to: CanonicalStatus::Paid,
                })
            }
            CreditOutcome::OwnerNotFound => {
                error!(
                    payment_id = %record.id,
                    owner_id = %record.owner_id,
                    "payment is paid but owner wallet does not exist"
                );
                let _ = self.events.send(ServiceEvent::CreditFailed {
                    payment_id: record.id,
                    message: format!("owner {} not found", record.owner_id),
                });
                Err(Error::OwnerNotFound {
                    payment_id: record.id,
                    owner_id: record.owner_id,
                })
            }
        }
    }
}
