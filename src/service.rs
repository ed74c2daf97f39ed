//! Service assembly: production collaborators, background sweep, HTTP serving.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::checkout::{AttemptRegistry, OrderBuilder, RazorpayClient, SignatureVerifier};
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::entitlements::{EntitlementStore, TierCatalog};
use crate::error::Result;
use crate::event::{create_event_channel, EngineEvent, EngineEventsChannel, EngineEventsSender};
use crate::http::{AppState, BearerIdentity};
use crate::purchase::PurchaseOrchestrator;
use crate::rates::{ExchangeRateClient, RateCache};

/// Builder for assembling the entitlement engine.
pub struct ServiceBuilder {
    config: ServiceConfig,
}

impl ServiceBuilder {
    /// Creates a builder over the given configuration.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    /// Assembles the engine with its production collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when required credentials are
    /// missing or an HTTP client cannot be constructed.
    pub fn build(self) -> Result<RunningService> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (events_tx, events_rx) = create_event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let provider = Arc::new(ExchangeRateClient::new(
            &self.config.rates,
            &self.config.currency,
        )?);
        let rates = Arc::new(RateCache::with_events(
            provider,
            clock.clone(),
            self.config.rates.ttl(),
            events_tx.clone(),
        ));
        let gateway = Arc::new(RazorpayClient::new(&self.config.checkout)?);
        let orders = OrderBuilder::new(
            rates,
            gateway,
            clock.clone(),
            self.config.currency.clone(),
        );
        let verifier = SignatureVerifier::new(self.config.checkout.key_secret.clone());
        let store = Arc::new(EntitlementStore::new());
        let attempts = AttemptRegistry::with_capacity(self.config.checkout.pending_capacity);

        let engine = Arc::new(PurchaseOrchestrator::new(
            TierCatalog::standard(),
            orders,
            verifier,
            store.clone(),
            attempts,
            events_tx.clone(),
            clock.clone(),
        ));

        Ok(RunningService {
            config: self.config,
            engine,
            store,
            clock,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// An assembled engine ready to serve HTTP.
pub struct RunningService {
    config: ServiceConfig,
    engine: Arc<PurchaseOrchestrator>,
    store: Arc<EntitlementStore>,
    clock: Arc<dyn Clock>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: EngineEventsSender,
    events_rx: Option<EngineEventsChannel>,
}

impl RunningService {
    /// The address the service binds when run.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    /// The purchase engine, for embedding without the HTTP surface.
    #[must_use]
    pub fn engine(&self) -> Arc<PurchaseOrchestrator> {
        self.engine.clone()
    }

    /// Get a receiver for engine events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<EngineEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe_events(&self) -> EngineEventsChannel {
        self.events_tx.subscribe()
    }

    /// Serves HTTP until [`Self::shutdown`] is called or ctrl-c arrives.
    ///
    /// Also spawns the periodic sweep that drops expired entitlements.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind or the server
    /// fails while accepting connections.
    pub async fn run(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        let local = listener.local_addr()?;
        info!(%local, currency = %self.config.currency, "entitlement engine listening");

        let _ = self.events_tx.send(EngineEvent::Started);
        self.spawn_sweeper();

        let state = AppState::new(self.engine.clone(), Arc::new(BearerIdentity));
        let router = crate::http::router(state);

        let mut shutdown_rx = self.shutdown_rx.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = tokio::signal::ctrl_c() => {
                            info!("Ctrl-C received, initiating shutdown");
                            break;
                        }
                    }
                }
            })
            .await?;

        let _ = self.events_tx.send(EngineEvent::ShuttingDown);
        info!("entitlement engine shutdown complete");
        Ok(())
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn spawn_sweeper(&self) {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let events_tx = self.events_tx.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        // interval panics on a zero period
        let period = Duration::from_secs(self.config.entitlements.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired(clock.now());
                        if removed > 0 {
                            info!(removed, "swept expired entitlements");
                        }
                        let _ = events_tx.send(EngineEvent::EntitlementsSwept { removed });
                    }
                }
            }
        });
    }
}
