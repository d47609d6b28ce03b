//! Issuing new PIX payments.

use crate::error::{Error, Result};
use crate::gateway::{GatewayAccounts, GatewayError, QuoteRequest};
use crate::payment::{major_to_cents, OwnerId, PaymentRecord, PaymentStore};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Requests QR codes from the gateway and records the new payments.
pub struct PaymentIssuer {
    accounts: Arc<dyn GatewayAccounts>,
    store: Arc<dyn PaymentStore>,
    quote_expiration: Duration,
}

impl PaymentIssuer {
    /// Create an issuer whose QR codes live for `quote_expiration`.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn GatewayAccounts>,
        store: Arc<dyn PaymentStore>,
        quote_expiration: Duration,
    ) -> Self {
        Self {
            accounts,
            store,
            quote_expiration,
        }
    }

    /// Issue a QR code for `amount` and persist a `pending` payment.
    ///
    /// Accounts are asked in rotation order until one issues the code; that
    /// account becomes the payment's affinity.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a non-positive or unrepresentable amount.
    /// - [`Error::Config`] if no account is usable.
    /// - [`Error::Gateway`] with the first account's error if none issued.
    pub async fn create_payment(&self, owner_id: OwnerId, amount: Decimal) -> Result<PaymentRecord> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!("amount must be positive, got {amount}")));
        }
        let value_cents = major_to_cents(amount)
            .filter(|cents| *cents > 0)
            .ok_or_else(|| Error::Validation(format!("amount {amount} cannot be charged")))?;

        let request = QuoteRequest {
            value_cents,
            expiration_secs: self.quote_expiration.as_secs(),
            metadata: json!({ "owner_id": owner_id }),
        };

        let rotation = self.accounts.rotation();
        if rotation.is_empty() {
            return Err(Error::Config("no usable gateway account is configured".to_string()));
        }

        let mut first_error: Option<GatewayError> = None;
        for account in rotation {
            let quote = match self.accounts.create_quote(account, &request).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!(%account, %owner_id, "quote creation failed, trying next account: {e}");
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            let mut record = PaymentRecord::new(owner_id, amount, quote.reference_code);
            record.idempotent_id = quote.idempotent_id;
            record.qr_code_text = quote.qr_code_text;
            record.account_affinity = Some(account);
            record.expires_at = Some(quote.expires_at.unwrap_or_else(|| {
                Utc::now()
                    + chrono::Duration::from_std(self.quote_expiration)
                        .unwrap_or_else(|_| chrono::Duration::hours(1))
            }));

            self.store.insert(record.clone()).await?;
            info!(
                payment_id = %record.id,
                reference_code = %record.reference_code,
                %owner_id,
                %amount,
                %account,
                "payment issued"
            );
            return Ok(record);
        }

        Err(first_error.map_or_else(
            || Error::Config("no usable gateway account is configured".to_string()),
            Error::Gateway,
        ))
    }
}
