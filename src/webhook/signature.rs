//! Gateway webhook parsing and digest verification.
//!
//! The gateway signs each notification with an MD5 digest over a canonical
//! string that ends in the shared secret. The string depends on the kind:
//!
//! ```text
//! pix_payment                        payment.<reference_code>.<idempotent_id>.<value_cents>.<secret>
//! pix_qrcode / pix_static_qrcode     qrcode.<reference_code>.<end_to_end>.<value_cents>.<secret>
//! ```
//!
//! The two formulas are not interchangeable. Unknown kinds are not an
//! error: they verify as [`VerificationResult::Ignored`] so the caller can
//! acknowledge them.

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification kinds the gateway sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// `pix_payment`
    Payment,
    /// `pix_qrcode`
    QrCode,
    /// `pix_static_qrcode`
    StaticQrCode,
    /// Anything else; acknowledged and ignored.
    Other(String),
}

impl NotificationKind {
    /// Parse the `notification_type` field.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pix_payment" => Self::Payment,
            "pix_qrcode" => Self::QrCode,
            "pix_static_qrcode" => Self::StaticQrCode,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Payment => "pix_payment",
            Self::QrCode => "pix_qrcode",
            Self::StaticQrCode => "pix_static_qrcode",
            Self::Other(other) => other,
        }
    }

    /// Literal prefix of the canonical string, `None` for unknown kinds.
    #[must_use]
    pub fn domain(&self) -> Option<&'static str> {
        match self {
            Self::Payment => Some("payment"),
            Self::QrCode | Self::StaticQrCode => Some("qrcode"),
            Self::Other(_) => None,
        }
    }
}

/// Message body of a known notification kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// Amount in cents.
    pub value_cents: i64,
    /// Payment reference code.
    pub reference_code: String,
    /// Present on `pix_payment` notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_id: Option<String>,
    /// End-to-end id of the PIX transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_to_end: Option<String>,
    /// Gateway status vocabulary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Confirmation time, ISO 8601.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    notification_type: String,
    #[serde(default)]
    message: Value,
    #[serde(default)]
    md5: Option<String>,
}

/// A structurally valid notification of a known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Notification kind; never [`NotificationKind::Other`].
    pub kind: NotificationKind,
    /// Message body.
    pub message: WebhookMessage,
    /// Digest as received.
    pub digest: String,
}

/// A parsed webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookPayload {
    /// Known kind, ready for verification.
    Notification(Notification),
    /// Kind this service does not process.
    Unrecognized {
        /// The `notification_type` received.
        kind: String,
    },
}

impl WebhookPayload {
    /// Parse a raw webhook body.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the body is not a notification envelope, or
    /// a known kind lacks the fields its digest needs.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let envelope: RawEnvelope = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("invalid webhook envelope: {e}")))?;

        let kind = NotificationKind::parse(&envelope.notification_type);
        if let NotificationKind::Other(other) = &kind {
            return Ok(Self::Unrecognized {
                kind: other.clone(),
            });
        }

        let message: WebhookMessage = serde_json::from_value(envelope.message)
            .map_err(|e| Error::Validation(format!("invalid {} message: {e}", kind.as_str())))?;

        if message.reference_code.trim().is_empty() {
            return Err(Error::Validation("reference_code is empty".to_string()));
        }
        if kind == NotificationKind::Payment && message.idempotent_id.is_none() {
            return Err(Error::Validation(
                "pix_payment message has no idempotent_id".to_string(),
            ));
        }
        let digest = envelope
            .md5
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::Validation("md5 digest is missing".to_string()))?;

        Ok(Self::Notification(Notification {
            kind,
            message,
            digest,
        }))
    }

    /// Reference code claimed by the payload, if it has one.
    #[must_use]
    pub fn reference_code(&self) -> Option<&str> {
        match self {
            Self::Notification(n) => Some(&n.message.reference_code),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Outcome of digest verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Digest matches.
    Valid,
    /// Digest does not match or cannot be decoded.
    Invalid(String),
    /// Unknown notification kind; acknowledge without processing.
    Ignored,
}

/// Build the canonical string signed by the gateway.
///
/// Returns `None` for unknown kinds. A missing `end_to_end` or
/// `idempotent_id` contributes an empty segment.
#[must_use]
pub fn canonical_string(
    kind: &NotificationKind,
    message: &WebhookMessage,
    secret: &str,
) -> Option<String> {
    let domain = kind.domain()?;
    let middle = match kind {
        NotificationKind::Payment => message.idempotent_id.as_deref(),
        _ => message.end_to_end.as_deref(),
    }
    .unwrap_or_default();

    Some(format!(
        "{domain}.{}.{middle}.{}.{secret}",
        message.reference_code, message.value_cents
    ))
}

/// Lowercase hex MD5 of `input`.
#[must_use]
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Verify a parsed webhook against the shared secret.
///
/// The received digest is decoded from hex (either case) and compared as a
/// fixed-length 16-byte value.
#[must_use]
pub fn verify(payload: &WebhookPayload, secret: &str) -> VerificationResult {
    let notification = match payload {
        WebhookPayload::Notification(n) => n,
        WebhookPayload::Unrecognized { .. } => return VerificationResult::Ignored,
    };

    let Some(canonical) = canonical_string(&notification.kind, &notification.message, secret) else {
        return VerificationResult::Ignored;
    };
    let expected = Md5::digest(canonical.as_bytes());

    let received = match hex::decode(notification.digest.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return VerificationResult::Invalid(format!("digest is not hex: {e}")),
    };

    if received.as_slice() == expected.as_slice() {
        VerificationResult::Valid
    } else {
        VerificationResult::Invalid("digest mismatch".to_string())
    }
}
