//! In-process stand-in for the PIX gateway.
//!
//! One HTTP server serves every account. Accounts are told apart by the
//! client id in the Basic credentials of the token call, and by the bearer
//! token (`tok-<client_id>`) on data calls.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Behaviour of one stub account.
#[derive(Debug, Clone, Default)]
pub struct StubAccount {
    /// Answer data calls with 503. Tokens are still issued.
    pub down: bool,
    /// Answer status queries with fields at the top level instead of
    /// under `qrcode`.
    pub flat_shape: bool,
    /// Reference code → gateway status string.
    pub payments: HashMap<String, String>,
    /// Tokens issued so far.
    pub token_grants: usize,
}

#[derive(Default)]
struct StubInner {
    accounts: HashMap<String, StubAccount>,
    /// `(client_id, reference_code)` of every status query, in order.
    status_calls: Vec<(String, String)>,
    issued: u64,
}

#[derive(Clone, Default)]
struct StubState {
    inner: Arc<Mutex<StubInner>>,
}

/// A running stub gateway.
pub struct StubGateway {
    /// Base URL to configure as `gateway.base_url`.
    pub base_url: String,
    state: StubState,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Client secret the stub expects for `client_id`.
pub fn secret_for(client_id: &str) -> String {
    format!("secret-{client_id}")
}

impl StubGateway {
    /// Start a stub knowing the given client ids.
    pub async fn start(client_ids: &[&str]) -> std::io::Result<Self> {
        let state = StubState::default();
        {
            let mut inner = state.inner.lock();
            for id in client_ids {
                inner
                    .accounts
                    .insert((*id).to_string(), StubAccount::default());
            }
        }

        let app = Router::new()
            .route("/auth/generate_token", post(generate_token))
            .route("/pix/qrcodes", post(create_qrcode))
            .route("/pix/qrcodes/:reference", get(get_qrcode))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
        })
    }

    /// Change the behaviour of one account.
    pub fn with_account<R>(&self, client_id: &str, f: impl FnOnce(&mut StubAccount) -> R) -> R {
        let mut inner = self.state.inner.lock();
        let account = inner.accounts.entry(client_id.to_string()).or_default();
        f(account)
    }

    /// Register `reference` on `client_id` with a gateway status.
    pub fn put_payment(&self, client_id: &str, reference: &str, status: &str) {
        self.with_account(client_id, |a| {
            a.payments.insert(reference.to_string(), status.to_string());
        });
    }

    /// Take an account down or bring it back.
    pub fn set_down(&self, client_id: &str, down: bool) {
        self.with_account(client_id, |a| a.down = down);
    }

    /// Tokens issued to `client_id`.
    pub fn token_grants(&self, client_id: &str) -> usize {
        self.with_account(client_id, |a| a.token_grants)
    }

    /// Client ids of every status query, in order.
    pub fn status_callers(&self) -> Vec<String> {
        self.state
            .inner
            .lock()
            .status_calls
            .iter()
            .map(|(client, _)| client.clone())
            .collect()
    }

    /// Forget recorded status queries.
    pub fn clear_calls(&self) {
        self.state.inner.lock().status_calls.clear();
    }

    /// Stop serving.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for StubGateway {
    fn drop(&mut self) {
        self.stop();
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn basic_client_id(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

fn bearer_client_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    value
        .strip_prefix("Bearer tok-")
        .map(str::to_string)
}

async fn generate_token(State(state): State<StubState>, headers: HeaderMap, body: String) -> Response {
    if !body.contains("grant_type=client_credentials") {
        return error(StatusCode::BAD_REQUEST, "unsupported grant_type");
    }
    let Some((client_id, secret)) = basic_client_id(&headers) else {
        return error(StatusCode::UNAUTHORIZED, "missing credentials");
    };

    let mut inner = state.inner.lock();
    let Some(account) = inner.accounts.get_mut(&client_id) else {
        return error(StatusCode::UNAUTHORIZED, "unknown client");
    };
    if secret != secret_for(&client_id) {
        return error(StatusCode::UNAUTHORIZED, "bad secret");
    }
    account.token_grants += 1;

    Json(json!({
        "data": { "access_token": format!("tok-{client_id}"), "expires_in": 3600 }
    }))
    .into_response()
}

async fn create_qrcode(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(client_id) = bearer_client_id(&headers) else {
        return error(StatusCode::UNAUTHORIZED, "missing token");
    };
    if body.get("value_cents").and_then(Value::as_i64).unwrap_or(0) <= 0 {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "value_cents must be positive");
    }

    let mut inner = state.inner.lock();
    inner.issued += 1;
    let n = inner.issued;
    let Some(account) = inner.accounts.get_mut(&client_id) else {
        return error(StatusCode::UNAUTHORIZED, "unknown token");
    };
    if account.down {
        return error(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
    }

    let reference = format!("REF-{n}");
    account
        .payments
        .insert(reference.clone(), "awaiting_payment".to_string());

    (
        StatusCode::CREATED,
        Json(json!({
            "data": {
                "qrcode": {
                    "reference_code": reference,
                    "idempotent_id": format!("IDEM-{n}"),
                    "content": format!("00020126580014br.gov.bcb.pix-{n}"),
                    "expires_at": "2099-01-01T00:00:00Z"
                }
            }
        })),
    )
        .into_response()
}

async fn get_qrcode(
    State(state): State<StubState>,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> Response {
    let Some(client_id) = bearer_client_id(&headers) else {
        return error(StatusCode::UNAUTHORIZED, "missing token");
    };

    let mut inner = state.inner.lock();
    inner
        .status_calls
        .push((client_id.clone(), reference.clone()));
    let Some(account) = inner.accounts.get(&client_id) else {
        return error(StatusCode::UNAUTHORIZED, "unknown token");
    };
    if account.down {
        return error(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
    }
    let Some(status) = account.payments.get(&reference) else {
        return error(StatusCode::NOT_FOUND, "qrcode not found");
    };

    let mut fields = json!({
        "reference_code": reference,
        "status": status,
        "value_cents": 10_000,
    });
    if status == "paid" || status == "completed" {
        fields["paid_at"] = json!("2024-05-01 12:30:00");
    }

    if account.flat_shape {
        Json(fields).into_response()
    } else {
        Json(json!({ "qrcode": fields })).into_response()
    }
}
