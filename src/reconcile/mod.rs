//! Reconciliation against the gateway: resolving status across accounts,
//! synchronising unsettled payments and issuing new ones.

mod issuer;
mod resolver;
mod sync;

pub use issuer::PaymentIssuer;
pub use resolver::{AccountAttempt, ExternalStatus, Resolution, ResolveFailure, Resolver};
pub use sync::{PaymentSyncOutcome, SyncEngine, SyncReport, SyncResult};
