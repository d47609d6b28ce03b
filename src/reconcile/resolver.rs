//! Multi-account status resolution with affinity and fallback.

use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::gateway::{AccountIndex, ErrorKind, GatewayAccounts, GatewayError, RawStatus};
use crate::payment::{normalize, CanonicalStatus, PaymentRecord, PaymentStore};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What the gateway says about a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalStatus {
    /// An account answered with a status.
    Found {
        /// Normalised status.
        status: CanonicalStatus,
        /// Confirmation time reported by the gateway.
        paid_at: Option<DateTime<Utc>>,
        /// Amount reported by the gateway, in cents.
        value_cents: Option<i64>,
    },
    /// The only configured account does not know the payment.
    NotFound,
}

/// Successful resolution of one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// External status.
    pub status: ExternalStatus,
    /// Account that answered.
    pub resolved_account: AccountIndex,
    /// True if the payment's affinity was rewritten to `resolved_account`.
    pub affinity_changed: bool,
}

/// One failed call during a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAttempt {
    /// Account queried.
    pub account: AccountIndex,
    /// How it failed.
    pub error: GatewayError,
}

impl fmt::Display for AccountAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account {}: {}", self.account, self.error)
    }
}

/// Every account was tried and none answered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveFailure {
    /// The rotation is empty.
    #[error("no usable gateway account is configured")]
    NoAccounts,

    /// All accounts failed; `first` is the error reported to callers.
    #[error("all gateway accounts failed, first {first}")]
    Exhausted {
        /// Failure of the first account tried.
        first: AccountAttempt,
        /// Failures of the remaining accounts, in the order tried.
        rest: Vec<AccountAttempt>,
    },
}

impl ResolveFailure {
    /// The first account's error, if any account was tried.
    #[must_use]
    pub fn first_error(&self) -> Option<&GatewayError> {
        match self {
            Self::NoAccounts => None,
            Self::Exhausted { first, .. } => Some(&first.error),
        }
    }

    /// Returns true if every account tried answered 404.
    #[must_use]
    pub fn is_absent_everywhere(&self) -> bool {
        match self {
            Self::NoAccounts => false,
            Self::Exhausted { first, rest } => std::iter::once(first)
                .chain(rest)
                .all(|a| a.error.kind() == ErrorKind::NotFound),
        }
    }

    /// Number of accounts tried.
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::NoAccounts => 0,
            Self::Exhausted { rest, .. } => rest.len() + 1,
        }
    }
}

/// Answers "what is the external status of this payment" across accounts.
///
/// The affinity account (or the first configured account) is asked first,
/// then every other account in configuration order, each at most once.
/// Outer retry cadence belongs to the caller.
pub struct Resolver {
    accounts: Arc<dyn GatewayAccounts>,
    store: Arc<dyn PaymentStore>,
    events: ServiceEventsSender,
}

impl Resolver {
    /// Create a resolver over the given accounts.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn GatewayAccounts>,
        store: Arc<dyn PaymentStore>,
        events: ServiceEventsSender,
    ) -> Self {
        Self {
            accounts,
            store,
            events,
        }
    }

    /// Order in which accounts are queried for `record`.
    fn query_order(&self, record: &PaymentRecord) -> Vec<AccountIndex> {
        let mut rotation = self.accounts.rotation();
        if let Some(affinity) = record.account_affinity {
            if let Some(pos) = rotation.iter().position(|a| *a == affinity) {
                let preferred = rotation.remove(pos);
                rotation.insert(0, preferred);
            } else {
                debug!(
                    payment_id = %record.id,
                    account = %affinity,
                    "affinity account not in rotation"
                );
            }
        }
        rotation
    }

    /// Resolve the external status of `record`.
    ///
    /// A 404 is final only when a single account is configured; otherwise
    /// the next account is asked. Affinity is persisted when an account other
    /// than the recorded one answers.
    ///
    /// # Errors
    ///
    /// [`ResolveFailure`] carrying the first account's error when no
    /// account answered.
    pub async fn resolve(&self, record: &PaymentRecord) -> Result<Resolution, ResolveFailure> {
        let order = self.query_order(record);
        let sole_account = order.len() == 1;
        let mut failures: Vec<AccountAttempt> = Vec::new();

        for account in order {
            match self.query(account, &record.reference_code).await {
                Ok(raw) => {
                    let status = ExternalStatus::Found {
                        status: normalize(raw.status.as_deref()),
                        paid_at: raw.paid_at,
                        value_cents: raw.value_cents,
                    };
                    let affinity_changed = self.remember_affinity(record, account).await;
                    return Ok(Resolution {
                        status,
                        resolved_account: account,
                        affinity_changed,
                    });
                }
                Err(GatewayError::NotFound(_)) if sole_account => {
                    debug!(
                        payment_id = %record.id,
                        %account,
                        "sole gateway account does not know payment"
                    );
                    return Ok(Resolution {
                        status: ExternalStatus::NotFound,
                        resolved_account: account,
                        affinity_changed: false,
                    });
                }
                Err(error) => {
                    warn!(
                        payment_id = %record.id,
                        reference_code = %record.reference_code,
                        %account,
                        kind = ?error.kind(),
                        "status query failed, trying next account: {error}"
                    );
                    failures.push(AccountAttempt { account, error });
                }
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            Some(first) => Err(ResolveFailure::Exhausted {
                first,
                rest: failures.collect(),
            }),
            None => Err(ResolveFailure::NoAccounts),
        }
    }

    async fn query(&self, account: AccountIndex, reference_code: &str) -> Result<RawStatus, GatewayError> {
        let raw = self.accounts.get_status(account, reference_code).await?;
        match raw.reference_code.as_deref() {
            Some(reported) if reported != reference_code => Err(GatewayError::UnrecognizedShape(
                format!("answered for reference {reported}, asked for {reference_code}"),
            )),
            _ => Ok(raw),
        }
    }

    /// Persist `account` as the payment's affinity if it changed.
    async fn remember_affinity(&self, record: &PaymentRecord, account: AccountIndex) -> bool {
        if record.account_affinity == Some(account) {
            return false;
        }
        if let Err(e) = self.store.set_affinity(record.id, account).await {
            warn!(payment_id = %record.id, %account, "failed to persist account affinity: {e}");
            return false;
        }
        info!(
            payment_id = %record.id,
            previous = ?record.account_affinity,
            %account,
            "account affinity updated"
        );
        let _ = self.events.send(ServiceEvent::AffinityChanged {
            payment_id: record.id,
            account,
        });
        true
    }
}
