//! Inbound gateway notifications.
//!
//! [`signature`] parses the envelope and checks the MD5 digest;
//! [`WebhookProcessor`] turns a verified notification into a ledger
//! transition, skipping deliveries it has already applied.

mod handler;
pub mod signature;

pub use handler::{WebhookOutcome, WebhookProcessor};
pub use signature::{
    canonical_string, md5_hex, verify, Notification, NotificationKind, VerificationResult,
    WebhookMessage, WebhookPayload,
};
