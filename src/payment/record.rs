//! Persisted payment and ledger types.

use crate::error::{Error, Result};
use crate::gateway::AccountIndex;
use crate::payment::status::CanonicalStatus;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal payment identity.
pub type PaymentId = Uuid;

/// Wallet owner identity.
pub type OwnerId = Uuid;

/// A PIX payment request and its locally known lifecycle.
///
/// Records are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Internal identity.
    pub id: PaymentId,
    /// Wallet owner credited when the payment is paid.
    pub owner_id: OwnerId,
    /// Requested amount in currency major units (e.g. `100.00`).
    pub amount_major_units: Decimal,
    /// External correlation id assigned by the gateway; lookup key for
    /// both the webhook and the polling path.
    pub reference_code: String,
    /// Second external identifier, part of the `pix_payment` digest input.
    pub idempotent_id: Option<String>,
    /// Locally known canonical status.
    pub status: CanonicalStatus,
    /// Gateway account that last answered for this record. A hint only.
    pub account_affinity: Option<AccountIndex>,
    /// Copy-and-paste PIX payload returned when the QR code was issued.
    pub qr_code_text: Option<String>,
    /// When the QR code stops being payable.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the payment was confirmed.
    pub paid_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Create a new `pending` record.
    #[must_use]
    pub fn new(owner_id: OwnerId, amount_major_units: Decimal, reference_code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            amount_major_units,
            reference_code,
            idempotent_id: None,
            status: CanonicalStatus::Pending,
            account_affinity: None,
            qr_code_text: None,
            expires_at: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    /// Amount in cents, as the gateway reports `value_cents`.
    #[must_use]
    pub fn amount_cents(&self) -> Option<i64> {
        major_to_cents(self.amount_major_units)
    }
}

/// Convert a major-unit amount to whole cents, rounding half away from zero.
#[must_use]
pub fn major_to_cents(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// One immutable wallet ledger entry.
///
/// An entry whose `related_payment_id` names a payment is the proof that
/// this payment was credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Entry identity.
    pub id: Uuid,
    /// Wallet owner.
    pub owner_id: OwnerId,
    /// Signed balance change.
    pub delta: Decimal,
    /// Balance before the change.
    pub balance_before: Decimal,
    /// Balance after the change; always `balance_before + delta`.
    pub balance_after: Decimal,
    /// Human readable description.
    pub description: String,
    /// Payment that caused the change, if any.
    pub related_payment_id: Option<PaymentId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Build an entry for `delta` applied on top of `balance_before`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the resulting balance is not representable.
    pub fn new(
        owner_id: OwnerId,
        balance_before: Decimal,
        delta: Decimal,
        description: String,
        related_payment_id: Option<PaymentId>,
    ) -> Result<Self> {
        let balance_after = balance_before.checked_add(delta).ok_or_else(|| {
            Error::Store(format!(
                "wallet {owner_id} balance {balance_before} cannot absorb {delta}"
            ))
        })?;
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            delta,
            balance_before,
            balance_after,
            description,
            related_payment_id,
            created_at: Utc::now(),
        })
    }
}
