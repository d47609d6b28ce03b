//! Tolerant parsing of gateway response bodies.
//!
//! The gateway does not use one fixed envelope: a status body may nest its
//! fields under `qrcode`, under `data`, under `data.qrcode`, or present them
//! flat. Each parser tries a short, ordered list of known shapes and either
//! produces one canonical struct or fails with
//! [`GatewayError::UnrecognizedShape`].

use crate::gateway::GatewayError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

/// Token lifetime assumed when the grant does not state one.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Longest token lifetime taken from a grant.
const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Bearer token issued by `/auth/generate_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Opaque bearer token.
    pub access_token: String,
    /// Lifetime from the moment of issue.
    pub expires_in: Duration,
}

/// Status fields pulled from a QR code query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStatus {
    /// Reference code echoed back by the gateway.
    pub reference_code: Option<String>,
    /// Gateway status vocabulary, not yet normalised.
    pub status: Option<String>,
    /// Amount in cents.
    pub value_cents: Option<i64>,
    /// Confirmation time, when paid.
    pub paid_at: Option<DateTime<Utc>>,
}

/// A freshly issued QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResult {
    /// External correlation id of the new payment.
    pub reference_code: String,
    /// Secondary identifier, when the gateway assigns one at issue time.
    pub idempotent_id: Option<String>,
    /// Copy-and-paste PIX payload.
    pub qr_code_text: Option<String>,
    /// Rendered QR image location or data URI.
    pub qr_code_image: Option<String>,
    /// Expiry reported by the gateway.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Candidate objects to look in, most specific first.
fn candidates<'a>(root: &'a Value, nested: &str) -> Vec<&'a Map<String, Value>> {
    let data = root.get("data");
    [
        root.get(nested),
        data.and_then(|d| d.get(nested)),
        data,
        Some(root),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_object)
    .collect()
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn integer_field(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn timestamp_field(object: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .find_map(|key| object.get(*key)?.as_str().and_then(parse_timestamp))
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn describe(root: &Value) -> String {
    match root {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        other => format!("non-object body: {other}"),
    }
}

impl TokenGrant {
    /// Parse a token grant body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnrecognizedShape`] if no token is present.
    pub fn from_value(root: &Value) -> Result<Self, GatewayError> {
        for object in candidates(root, "token") {
            if let Some(access_token) = string_field(object, &["access_token", "token"]) {
                let expires_in = integer_field(object, &["expires_in"])
                    .and_then(|secs| u64::try_from(secs).ok())
                    .map_or(DEFAULT_TOKEN_TTL, Duration::from_secs)
                    .min(MAX_TOKEN_TTL);
                return Ok(Self {
                    access_token,
                    expires_in,
                });
            }
        }
        Err(GatewayError::UnrecognizedShape(format!(
            "token grant: {}",
            describe(root)
        )))
    }
}

impl RawStatus {
    /// Parse a status query body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnrecognizedShape`] if no candidate object
    /// carries a `status` or `reference_code`.
    pub fn from_value(root: &Value) -> Result<Self, GatewayError> {
        let object = candidates(root, "qrcode")
            .into_iter()
            .find(|o| o.contains_key("status") || o.contains_key("reference_code"))
            .ok_or_else(|| {
                GatewayError::UnrecognizedShape(format!("status query: {}", describe(root)))
            })?;

        Ok(Self {
            reference_code: string_field(object, &["reference_code"]),
            status: string_field(object, &["status"]),
            value_cents: integer_field(object, &["value_cents"]),
            paid_at: timestamp_field(object, &["paid_at", "payment_date"]),
        })
    }
}

impl QuoteResult {
    /// Parse a QR code creation body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnrecognizedShape`] if no `reference_code`
    /// is present.
    pub fn from_value(root: &Value) -> Result<Self, GatewayError> {
        for object in candidates(root, "qrcode") {
            if let Some(reference_code) = string_field(object, &["reference_code"]) {
                return Ok(Self {
                    reference_code,
                    idempotent_id: string_field(object, &["idempotent_id"]),
                    qr_code_text: string_field(object, &["content", "emv", "copy_paste"]),
                    qr_code_image: string_field(object, &["image_base64", "image_url", "image"]),
                    expires_at: timestamp_field(object, &["expires_at", "expiration_date"]),
                });
            }
        }
        Err(GatewayError::UnrecognizedShape(format!(
            "qrcode creation: {}",
            describe(root)
        )))
    }
}
