//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Marketplace (ledger, escrow, negotiations over one store)
//! - Event Bus (notifications out of the settlement core)
//! - Notification Inbox (per-user read model)
//! - Scheduler (expiry sweeps, daily limit rollover)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start inbox and scheduler tasks
//! 4. Start API server
//! 5. Main event loop (log notifications)
//! 6. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agora_engine::{Clock, Collaborators, Marketplace, MemoryJobRegistry, SystemClock};
use agora_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};
use crate::notifications::NotificationInbox;
use crate::scheduler::Scheduler;

// =============================================================================
// Daemon
// =============================================================================

/// The main Agora daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Settlement core
    marketplace: Arc<Marketplace<S>>,
    /// In-process job registry
    jobs: Arc<MemoryJobRegistry>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Notification read model
    inbox: Arc<NotificationInbox>,
    /// Time source shared with the core
    clock: Arc<dyn Clock>,
    /// Stops background tasks
    cancel: CancellationToken,
}

impl Daemon<MemoryStore> {
    /// Create a daemon over an in-memory store and the system clock.
    pub fn new(config: Config) -> Self {
        Self::with_components(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a daemon with a provided store and clock.
    pub fn with_components(config: Config, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let jobs = Arc::new(MemoryJobRegistry::new());
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));

        let marketplace = Arc::new(Marketplace::new(
            store,
            Collaborators {
                jobs: jobs.clone(),
                events: event_bus.clone(),
                clock: clock.clone(),
            },
            config.marketplace(),
        ));

        Self {
            config,
            marketplace,
            jobs,
            event_bus,
            inbox: Arc::new(NotificationInbox::new()),
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// Settlement core behind this daemon.
    pub fn marketplace(&self) -> &Arc<Marketplace<S>> {
        &self.marketplace
    }

    /// Notification inbox.
    pub fn inbox(&self) -> &Arc<NotificationInbox> {
        &self.inbox
    }

    /// Build the HTTP router over this daemon's components.
    pub fn router(&self) -> Router {
        create_router(Arc::new(ApiState {
            marketplace: self.marketplace.clone(),
            jobs: self.jobs.clone(),
            inbox: self.inbox.clone(),
            clock: self.clock.clone(),
        }))
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting Agora daemon"
        );

        // Subscribe before anything can publish
        let mut event_receiver = self.event_bus.subscribe();

        let inbox_task = self.inbox.clone().start(&self.event_bus, self.cancel.clone());
        let scheduler = Arc::new(Scheduler::new(
            self.marketplace.clone(),
            self.clock.clone(),
            self.config.scheduler,
            self.cancel.clone(),
        ));
        let scheduler_task = scheduler.start();

        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event_result) = event_receiver.recv() => {
                    match event_result {
                        Ok(event) => {
                            if let Err(DaemonError::Shutdown) = self.handle_event(event) {
                                break;
                            }
                        }
                        Err(lag_msg) => {
                            warn!(%lag_msg, "Event receiver lagged");
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        for (name, task) in [("inbox", inbox_task), ("scheduler", scheduler_task)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Background task panicked");
            }
        }
        info!("Shutdown complete");

        Ok(())
    }

    /// Start the API server.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let router = self.router();
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener.local_addr()?;

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move { cancel.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Handle an event from the event bus.
    fn handle_event(&self, event: DaemonEvent) -> DaemonResult<()> {
        match event {
            DaemonEvent::Notification(notification) => {
                debug!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    title = %notification.title,
                    "Notification published"
                );
            },
            DaemonEvent::Shutdown => {
                info!("Shutdown event received");
                return Err(DaemonError::Shutdown);
            },
        }

        Ok(())
    }

    /// Graceful shutdown: stop background tasks and the API server.
    async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        self.cancel.cancel();
        self.event_bus.send(DaemonEvent::Shutdown);

        info!(notifications = self.inbox.len().await, "Inbox state at shutdown");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::HealthResponse;

    #[tokio::test]
    async fn test_daemon_creation() {
        let daemon = Daemon::new(Config::test());

        assert!(daemon.inbox().is_empty().await);
        assert!(!daemon.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new(Config::test());

        let addr = daemon.start_api_server().await.unwrap();
        assert!(addr.port() > 0);

        let client = reqwest::Client::new();
        let response = client.get(format!("http://{}/health", addr)).send().await.unwrap();

        assert!(response.status().is_success());
        let body: HealthResponse = response.json().await.unwrap();
        assert_eq!(body.status, "healthy");

        daemon.shutdown().await;
    }

    #[test]
    fn test_shutdown_event_stops_loop() {
        let daemon = Daemon::new(Config::test());

        assert!(matches!(daemon.handle_event(DaemonEvent::Shutdown), Err(DaemonError::Shutdown)));
    }
}
