//! Service assembly and lifecycle.

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, ServiceEvent, ServiceEventsChannel, ServiceEventsSender};
use crate::gateway::{AccountClientPool, GatewayAccounts};
use crate::payment::{DeliveryCache, InMemoryStore, LedgerService, PaymentStore};
use crate::reconcile::{PaymentIssuer, Resolver, SyncEngine};
use crate::server::{router, AppState};
use crate::webhook::WebhookProcessor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Builder for constructing the reconciliation service.
pub struct ServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<dyn PaymentStore>>,
}

impl ServiceBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Use `store` instead of a fresh in-memory store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PaymentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire every component and bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the HTTP client
    /// cannot be built or the listener cannot be bound.
    pub async fn build(self) -> Result<RunningService> {
        self.config.validate()?;
        info!(
            "Building pix-reconcile: bind {}, {} gateway account(s), payout rate {}",
            self.config.bind_addr,
            self.config.gateway.accounts.len(),
            self.config.ledger.payout_rate
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let accounts: Arc<dyn GatewayAccounts> =
            Arc::new(AccountClientPool::new(&self.config.gateway)?);
        if accounts.rotation().is_empty() {
            warn!("no usable gateway account; status pulls and payment creation will fail");
        }

        let ledger = Arc::new(LedgerService::new(
            Arc::clone(&store),
            self.config.ledger.payout_rate,
            events_tx.clone(),
        ));
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&accounts),
            Arc::clone(&store),
            events_tx.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            resolver,
            Arc::clone(&ledger),
            events_tx.clone(),
            self.config.sync.concurrency,
        ));
        let issuer = Arc::new(PaymentIssuer::new(
            accounts,
            Arc::clone(&store),
            Duration::from_secs(self.config.gateway.quote_expiration_secs),
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            self.config.webhook.secret.clone(),
            Arc::clone(&store),
            ledger,
            DeliveryCache::with_capacity(self.config.webhook.dedup_capacity),
            events_tx.clone(),
        ));

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(RunningService {
            config: self.config,
            state: AppState {
                webhooks,
                sync,
                issuer,
                store,
            },
            listener: Some(listener),
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// Requests shutdown of a [`RunningService`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// A wired service with a bound listener.
pub struct RunningService {
    config: ServiceConfig,
    state: AppState,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: ServiceEventsSender,
    events_rx: Option<ServiceEventsChannel>,
}

impl RunningService {
    /// Address the HTTP listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handler state, for embedding the router elsewhere.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a receiver for service events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to service events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServiceEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle that stops [`run`](Self::run) from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Serve HTTP and run the periodic sync until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the service was already run or the HTTP server
    /// fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self.listener.take().ok_or(Error::ShuttingDown)?;
        info!("Starting pix-reconcile on {}", self.local_addr);
        let _ = self.events_tx.send(ServiceEvent::Started);

        if self.config.sync.interval_secs > 0 {
            self.spawn_sync_loop(Duration::from_secs(self.config.sync.interval_secs));
        } else {
            info!("Periodic sync disabled");
        }

        let app = router(self.state.clone());
        let mut server_shutdown = self.shutdown_rx.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|stop| *stop).await;
                })
                .await
        });

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
            }
        }

        let _ = self.events_tx.send(ServiceEvent::ShuttingDown);
        match server.await {
            Ok(result) => result?,
            Err(e) => warn!("HTTP server task ended abnormally: {e}"),
        }
        info!("Service shutdown complete");
        Ok(())
    }

    fn spawn_sync_loop(&self, every: Duration) {
        let sync = Arc::clone(&self.state.sync);
        let mut shutdown_rx = self.shutdown_rx.clone();
        info!("Periodic sync every {}s", every.as_secs());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match sync.sync_all().await {
                            Ok(reports) => {
                                let errored: usize = reports.iter().map(|r| r.errored).sum();
                                info!(owners = reports.len(), errored, "periodic sync pass complete");
                            }
                            Err(e) => warn!("periodic sync pass failed: {e}"),
                        }
                    }
                }
            }
        });
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
