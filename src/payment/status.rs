//! Canonical payment status and normalisation of the gateway vocabulary.
//!
//! The gateway reports status with an ad-hoc, partly synonymous set of
//! strings (`completed`, `canceled`, `error`, ...). Everything past the
//! gateway boundary works with [`CanonicalStatus`] only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The system's own five-value payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    /// Created locally, no confirmation from the gateway yet.
    #[default]
    Pending,
    /// QR code issued, waiting for the payer.
    AwaitingPayment,
    /// Money received.
    Paid,
    /// QR code expired without payment.
    Expired,
    /// Cancelled or failed at the gateway.
    Cancelled,
}

impl CanonicalStatus {
    /// All canonical values, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::AwaitingPayment,
        Self::Paid,
        Self::Expired,
        Self::Cancelled,
    ];

    /// Returns true for `paid`, `expired` and `cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Expired | Self::Cancelled)
    }

    /// Returns true if a record in this status may move to `next`.
    ///
    /// `paid` is absorbing. `expired` and `cancelled` only give way to
    /// `paid`: the gateway confirming money outranks a local expiry.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return false;
        }
        match self {
            Self::Paid => false,
            Self::Expired | Self::Cancelled => next == Self::Paid,
            Self::Pending | Self::AwaitingPayment => true,
        }
    }

    /// Stable lowercase name, as stored and as rendered in API responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a gateway status string to the canonical set.
///
/// Total: unknown or missing values become [`CanonicalStatus::Pending`].
/// Matching ignores ASCII case and surrounding whitespace.
#[must_use]
pub fn normalize(external: Option<&str>) -> CanonicalStatus {
    let Some(raw) = external else {
        return CanonicalStatus::Pending;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "awaiting_payment" => CanonicalStatus::AwaitingPayment,
        "paid" | "completed" => CanonicalStatus::Paid,
        "expired" => CanonicalStatus::Expired,
        "cancelled" | "canceled" | "error" => CanonicalStatus::Cancelled,
        // "pending" and everything unrecognised
        _ => CanonicalStatus::Pending,
    }
}
