//! HTTP surface: gateway webhooks and the dashboard-facing endpoints.

use crate::error::Error;
use crate::payment::{OwnerId, PaymentId, PaymentStore};
use crate::reconcile::{PaymentIssuer, SyncEngine};
use crate::webhook::{WebhookOutcome, WebhookProcessor};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Inbound notification processing.
    pub webhooks: Arc<WebhookProcessor>,
    /// Pull-path synchronisation.
    pub sync: Arc<SyncEngine>,
    /// Payment creation.
    pub issuer: Arc<PaymentIssuer>,
    /// Payment lookups.
    pub store: Arc<dyn PaymentStore>,
}

/// Build the service router.
///
/// | Method | Path                       | Purpose                       |
/// |--------|----------------------------|-------------------------------|
/// | POST   | `/webhooks/pix`            | gateway notifications         |
/// | POST   | `/owners/:owner_id/sync`   | manual sync of one owner      |
/// | POST   | `/payments`                | issue a QR code               |
/// | GET    | `/payments/:id`            | read a payment                |
/// | POST   | `/payments/:id/sync`       | reconcile one payment         |
/// | GET    | `/health`                  | liveness                      |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/pix", post(pix_webhook))
        .route("/owners/:owner_id/sync", post(sync_owner))
        .route("/payments", post(create_payment))
        .route("/payments/:id", get(get_payment))
        .route("/payments/:id/sync", post(sync_payment))
        .with_state(state)
}

async fn health() -> Response {
    Json(json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") })).into_response()
}

async fn pix_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome = state.webhooks.process(&body).await;
    let status =
        StatusCode::from_u16(outcome.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match &outcome {
        WebhookOutcome::Applied { payment_id, result } => json!({
            "ok": true,
            "payment_id": payment_id,
            "status": result.status(),
            "changed": result.changed(),
        }),
        WebhookOutcome::Duplicate => json!({ "ok": true, "duplicate": true }),
        WebhookOutcome::PaidWithoutCredit { payment_id } => json!({
            "ok": true,
            "payment_id": payment_id,
            "status": "paid",
            "credited": false,
        }),
        WebhookOutcome::Ignored { kind } => json!({ "ok": true, "ignored": kind }),
        WebhookOutcome::Malformed(message)
        | WebhookOutcome::Unauthorized(message)
        | WebhookOutcome::UnknownPayment(message)
        | WebhookOutcome::Failed(message) => json!({ "ok": false, "error": message }),
    };
    (status, Json(body)).into_response()
}

async fn sync_owner(State(state): State<AppState>, Path(owner_id): Path<OwnerId>) -> Response {
    match state.sync.sync_owner(owner_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct CreatePaymentBody {
    owner_id: OwnerId,
    amount: Decimal,
}

async fn create_payment(
    State(state): State<AppState>,
    Json(body): Json<CreatePaymentBody>,
) -> Response {
    match state.issuer.create_payment(body.owner_id, body.amount).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_payment(State(state): State<AppState>, Path(id): Path<PaymentId>) -> Response {
    match state.store.get(id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(&Error::PaymentNotFound(id.to_string())),
        Err(e) => error_response(&e),
    }
}

async fn sync_payment(State(state): State<AppState>, Path(id): Path<PaymentId>) -> Response {
    match state.sync.sync_payment(id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(&e),
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::PaymentNotFound(_) | Error::OwnerNotFound { .. } => StatusCode::NOT_FOUND,
        Error::Gateway(_) | Error::Resolve(_) => StatusCode::BAD_GATEWAY,
        Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        Error::Config(_)
        | Error::Store(_)
        | Error::Io(_)
        | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &Error) -> Response {
    let status = status_for(error);
    if status.is_server_error() {
        warn!("request failed: {error}");
    }
    (status, Json(json!({ "ok": false, "error": error.to_string() }))).into_response()
}
