//! Pull path: reconcile an owner's unsettled payments against the gateway.

use crate::error::{Error, Result};
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::payment::{
    ApplyResult, CanonicalStatus, LedgerService, OwnerId, PaymentId, PaymentRecord, PaymentStore,
};
use crate::reconcile::resolver::{ExternalStatus, Resolver};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of reconciling one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncResult {
    /// Local status advanced.
    Updated {
        /// Status before.
        from: CanonicalStatus,
        /// Status after.
        to: CanonicalStatus,
        /// True if this call credited the wallet.
        credited: bool,
    },
    /// Nothing changed.
    Unchanged {
        /// Current status.
        status: CanonicalStatus,
    },
    /// The payment could not be reconciled this time.
    Errored {
        /// Failure description.
        message: String,
    },
}

/// Per-payment line of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSyncOutcome {
    /// Local payment id.
    pub payment_id: PaymentId,
    /// External reference code.
    pub reference_code: String,
    /// What happened.
    #[serde(flatten)]
    pub result: SyncResult,
}

/// Summary of one owner's synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Owner whose payments were reconciled.
    pub owner_id: OwnerId,
    /// Payments whose status changed.
    pub updated: usize,
    /// Payments left as they were.
    pub unchanged: usize,
    /// Payments that failed to reconcile.
    pub errored: usize,
    /// One line per payment, in creation order.
    pub outcomes: Vec<PaymentSyncOutcome>,
}

impl SyncReport {
    fn from_outcomes(owner_id: OwnerId, outcomes: Vec<PaymentSyncOutcome>) -> Self {
        let mut report = Self {
            owner_id,
            ..Self::default()
        };
        for outcome in &outcomes {
            match outcome.result {
                SyncResult::Updated { .. } => report.updated += 1,
                SyncResult::Unchanged { .. } => report.unchanged += 1,
                SyncResult::Errored { .. } => report.errored += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

/// Drives the resolver and ledger over unsettled payments.
pub struct SyncEngine {
    store: Arc<dyn PaymentStore>,
    resolver: Arc<Resolver>,
    ledger: Arc<LedgerService>,
    events: ServiceEventsSender,
    concurrency: usize,
}

impl SyncEngine {
    /// Create an engine reconciling up to `concurrency` payments at once.
    #[must_use]
    pub fn new(
        store: Arc<dyn PaymentStore>,
        resolver: Arc<Resolver>,
        ledger: Arc<LedgerService>,
        events: ServiceEventsSender,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            ledger,
            events,
            concurrency: concurrency.max(1),
        }
    }

    /// Reconcile every non-terminal payment of `owner_id`.
    ///
    /// Individual payment failures are reported per line, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the owner's payments cannot be listed.
    pub async fn sync_owner(&self, owner_id: OwnerId) -> Result<SyncReport> {
        let records = self.store.list_unsettled(owner_id).await?;
        debug!(%owner_id, pending = records.len(), "synchronising owner");

        let outcomes: Vec<PaymentSyncOutcome> = stream::iter(records)
            .map(|record| self.sync_record(record))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = SyncReport::from_outcomes(owner_id, outcomes);
        info!(
            %owner_id,
            updated = report.updated,
            unchanged = report.unchanged,
            errored = report.errored,
            "owner synchronised"
        );
        let _ = self.events.send(ServiceEvent::SyncCompleted {
            owner_id,
            updated: report.updated,
            unchanged: report.unchanged,
            errored: report.errored,
        });
        Ok(report)
    }

    /// Reconcile every owner that has unsettled payments.
    ///
    /// An owner whose listing fails is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the owners cannot be enumerated.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        let owners = self.store.owners_with_unsettled().await?;
        let mut reports = Vec::with_capacity(owners.len());
        for owner_id in owners {
            match self.sync_owner(owner_id).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(%owner_id, "skipping owner in sync pass: {e}"),
            }
        }
        Ok(reports)
    }

    /// Reconcile one payment by id, whatever its current status.
    ///
    /// # Errors
    ///
    /// [`Error::PaymentNotFound`] if no such payment exists.
    pub async fn sync_payment(&self, payment_id: PaymentId) -> Result<PaymentSyncOutcome> {
        let record = self
            .store
            .get(payment_id)
            .await?
            .ok_or_else(|| Error::PaymentNotFound(payment_id.to_string()))?;
        Ok(self.sync_record(record).await)
    }

    async fn sync_record(&self, record: PaymentRecord) -> PaymentSyncOutcome {
        let result = self.reconcile(&record).await;
        PaymentSyncOutcome {
            payment_id: record.id,
            reference_code: record.reference_code,
            result,
        }
    }

    async fn reconcile(&self, record: &PaymentRecord) -> SyncResult {
        let (status, paid_at) = match self.resolver.resolve(record).await {
            Ok(resolution) => match resolution.status {
                ExternalStatus::Found {
                    status,
                    paid_at,
                    value_cents,
                } => {
                    if value_cents.is_some() && value_cents != record.amount_cents() {
                        warn!(
                            payment_id = %record.id,
                            expected_cents = ?record.amount_cents(),
                            reported_cents = ?value_cents,
                            "gateway amount differs from local record"
                        );
                    }
                    (status, paid_at)
                }
                ExternalStatus::NotFound => (CanonicalStatus::Expired, None),
            },
            Err(failure) if failure.is_absent_everywhere() => {
                debug!(payment_id = %record.id, "no account knows payment, marking expired");
                (CanonicalStatus::Expired, None)
            }
            Err(failure) => {
                warn!(payment_id = %record.id, "could not resolve payment: {failure}");
                return SyncResult::Errored {
                    message: failure.to_string(),
                };
            }
        };

        match self.ledger.apply_transition(record.id, status, paid_at).await {
            Ok(ApplyResult::Credited { from, .. }) => SyncResult::Updated {
                from,
                to: CanonicalStatus::Paid,
                credited: true,
            },
            Ok(ApplyResult::Updated { from, to }) => SyncResult::Updated {
                from,
                to,
                credited: false,
            },
            Ok(ApplyResult::Unchanged { status }) => SyncResult::Unchanged { status },
            Err(e) => {
                error!(payment_id = %record.id, "sync could not apply status: {e}");
                SyncResult::Errored {
                    message: e.to_string(),
                }
            }
        }
    }
}
