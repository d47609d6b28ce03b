//! Payment records, canonical status and the exactly-once crediting guard.
//!
//! # Architecture
//!
//! ```text
//!   webhook (push)            sync job / manual check (pull)
//!        │                               │
//!        ▼                               ▼
//! ┌──────────────────┐        ┌──────────────────────┐
//! │ verify signature │        │ resolve across       │
//! └────────┬─────────┘        │ gateway accounts     │
//!          │                  └──────────┬───────────┘
//!          ▼                             ▼
//! ┌──────────────────────────────────────────────────┐
//! │ normalize(status) → CanonicalStatus              │
//! └─────────────────────────┬────────────────────────┘
//!                           ▼
//! ┌──────────────────────────────────────────────────┐
//! │ LedgerService::apply_transition                  │
//! │   CAS status ── won & now paid ──▶ credit wallet │
//! │        │                                         │
//! │      lost ──▶ re-read, re-evaluate               │
//! └─────────────────────────┬────────────────────────┘
//!                           ▼
//!                     PaymentStore
//! ```

mod cache;
mod ledger;
mod record;
mod status;
mod store;

pub use cache::{CacheStats, DeliveryCache, DeliveryKey};
pub use ledger::{ApplyResult, LedgerService};
pub use record::{major_to_cents, OwnerId, PaymentId, PaymentRecord, WalletTransaction};
pub use status::{normalize, CanonicalStatus};
pub use store::{CreditOutcome, InMemoryStore, PaymentStore};
