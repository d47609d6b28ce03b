//! Test harness that runs the service against the stub gateway.
//!
//! The `TestHarness` owns a [`StubGateway`], a shared in-memory store and a
//! running service bound to an ephemeral port, and offers helpers for the
//! calls a dashboard or the gateway would make.

use super::stub_gateway::{secret_for, StubGateway};
use pix_reconcile::config::AccountConfig;
use pix_reconcile::payment::{InMemoryStore, OwnerId, PaymentRecord, PaymentStore};
use pix_reconcile::service::ShutdownHandle;
use pix_reconcile::webhook::md5_hex;
use pix_reconcile::{ServiceBuilder, ServiceConfig, ServiceEventsChannel};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Webhook secret configured on the service under test.
pub const WEBHOOK_SECRET: &str = "e2e-webhook-secret";

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Stub gateway or listener error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Service error.
    #[error("Service error: {0}")]
    Service(#[from] pix_reconcile::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Client id of the stub account with configuration index `index`.
pub fn client_id(index: u16) -> String {
    format!("acct-{index}")
}

/// A running service wired to a stub gateway.
pub struct TestHarness {
    /// The stub gateway.
    pub gateway: StubGateway,
    /// Store shared with the service.
    pub store: Arc<InMemoryStore>,
    addr: SocketAddr,
    http: reqwest::Client,
    shutdown: ShutdownHandle,
    events: Option<ServiceEventsChannel>,
    task: Option<JoinHandle<pix_reconcile::Result<()>>>,
}

impl TestHarness {
    /// Start a stub with `accounts` accounts and a service using them.
    pub async fn setup(accounts: u16) -> Result<Self> {
        let ids: Vec<String> = (1..=accounts).map(client_id).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let gateway = StubGateway::start(&id_refs).await?;

        let mut config = ServiceConfig::default();
        config.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.webhook.secret = WEBHOOK_SECRET.to_string();
        config.sync.interval_secs = 0;
        config.gateway.base_url = gateway.base_url.clone();
        config.gateway.request_timeout_secs = 2;
        config.gateway.auth_timeout_secs = 5;
        config.gateway.accounts = (1..=accounts)
            .map(|index| AccountConfig {
                index,
                client_id: Some(client_id(index)),
                client_secret: Some(secret_for(&client_id(index))),
                enabled: true,
            })
            .collect();

        let store = Arc::new(InMemoryStore::new());
        let mut service = ServiceBuilder::new(config)
            .with_store(store.clone())
            .build()
            .await?;
        let addr = service.local_addr();
        let shutdown = service.shutdown_handle();
        let events = service.events();
        let task = tokio::spawn(async move { service.run().await });

        Ok(Self {
            gateway,
            store,
            addr,
            http: reqwest::Client::new(),
            shutdown,
            events,
            task: Some(task),
        })
    }

    /// Take the service event receiver.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events.take()
    }

    /// URL of `path` on the service.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Open a wallet for a fresh owner.
    pub fn new_owner(&self, balance: Decimal) -> OwnerId {
        let owner = Uuid::new_v4();
        self.store.open_wallet(owner, balance);
        owner
    }

    /// Insert a local payment without going through the gateway.
    pub async fn insert_payment(
        &self,
        owner: OwnerId,
        amount: Decimal,
        reference: &str,
    ) -> Result<PaymentRecord> {
        let record = PaymentRecord::new(owner, amount, reference.to_string());
        self.store.insert(record.clone()).await?;
        Ok(record)
    }

    /// POST a raw webhook body.
    pub async fn post_webhook(&self, body: &Value) -> Result<(u16, Value)> {
        let response = self
            .http
            .post(self.url("/webhooks/pix"))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// POST a manual sync for `owner`.
    pub async fn sync_owner(&self, owner: OwnerId) -> Result<(u16, Value)> {
        let response = self
            .http
            .post(self.url(&format!("/owners/{owner}/sync")))
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// POST a new payment.
    pub async fn create_payment(&self, owner: OwnerId, amount: &str) -> Result<(u16, Value)> {
        let response = self
            .http
            .post(self.url("/payments"))
            .json(&json!({ "owner_id": owner, "amount": amount }))
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// GET a payment.
    pub async fn get_payment(&self, id: Uuid) -> Result<(u16, Value)> {
        let response = self
            .http
            .get(self.url(&format!("/payments/{id}")))
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// Stop the service and the stub.
    pub async fn teardown(mut self) -> Result<()> {
        self.shutdown.shutdown();
        if let Some(task) = self.task.take() {
            if let Ok(result) = task.await {
                result?;
            }
        }
        self.gateway.stop();
        Ok(())
    }
}

/// A `pix_payment` webhook body signed with `secret`.
pub fn payment_webhook(reference: &str, idempotent_id: &str, cents: i64, status: &str, secret: &str) -> Value {
    let digest = md5_hex(&format!("payment.{reference}.{idempotent_id}.{cents}.{secret}"));
    json!({
        "notification_type": "pix_payment",
        "message": {
            "value_cents": cents,
            "reference_code": reference,
            "idempotent_id": idempotent_id,
            "end_to_end": "E2E0001",
            "status": status,
            "payment_date": "2024-05-01T12:30:00Z"
        },
        "md5": digest
    })
}

/// A `pix_qrcode` webhook body signed with `secret`.
pub fn qrcode_webhook(reference: &str, end_to_end: &str, cents: i64, status: &str, secret: &str) -> Value {
    let digest = md5_hex(&format!("qrcode.{reference}.{end_to_end}.{cents}.{secret}"));
    json!({
        "notification_type": "pix_qrcode",
        "message": {
            "value_cents": cents,
            "reference_code": reference,
            "end_to_end": end_to_end,
            "status": status
        },
        "md5": digest
    })
}
