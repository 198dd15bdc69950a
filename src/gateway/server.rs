//! Gateway server: accept loop, live reload, drain.
//!
//! # Responsibilities
//! - Spawn the admission dispatcher for this instance
//! - Accept connections and hand each to its own session task
//! - Apply config reloads to the admission limits
//! - Stop accepting on shutdown and drain open connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::session::{self, SessionContext};
use crate::admission::{AdmissionController, DispatchTiming, Dispatcher};
use crate::config::GatewayConfig;
use crate::lifecycle::Shutdown;
use crate::net::{ClientConnection, ConnectionTracker, Listener};
use crate::queue::OrderedQueueStore;
use crate::security::RateLimiter;

/// Pause after an accept failure caused by descriptor or memory exhaustion.
const ACCEPT_EXHAUSTED_PAUSE: Duration = Duration::from_millis(100);

pub struct GatewayServer {
    config: GatewayConfig,
    ctx: Arc<SessionContext>,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, store: Arc<dyn OrderedQueueStore>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            config.queue.key.clone(),
            DispatchTiming::from_config(&config.queue),
        ));
        let admission = Arc::new(AdmissionController::new(
            store,
            config.queue.key.clone(),
            config.queue.capacity,
            Arc::clone(&dispatcher),
        ));
        let ctx = Arc::new(SessionContext {
            admission,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            backend: config.backend.clone(),
            max_wait: config.queue.max_wait(),
        });

        tracing::info!(
            instance = %ctx.admission.instance_id(),
            capacity = config.queue.capacity,
            backend = %config.backend.address,
            "Gateway initialized"
        );

        Self {
            config,
            ctx,
            dispatcher,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.ctx.admission
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept until shutdown, then wait for open connections to finish.
    pub async fn run(
        mut self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: &Shutdown,
    ) {
        let dispatcher = tokio::spawn(Arc::clone(&self.dispatcher).run(shutdown.subscribe()));
        let mut stop = shutdown.subscribe();
        let mut updates_open = true;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if !self.spawn_session(stream, peer, shutdown) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Accept failed");
                        if e.is_resource_exhaustion() {
                            tokio::time::sleep(ACCEPT_EXHAUSTED_PAUSE).await;
                        }
                    }
                },
                update = config_updates.recv(), if updates_open => match update {
                    Some(new_config) => self.apply_reload(new_config),
                    None => updates_open = false,
                },
                _ = stop.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let drain_timeout = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        tracing::info!(
            active = self.tracker.active_count(),
            timeout_secs = drain_timeout.as_secs(),
            "Draining connections"
        );
        if !self.tracker.wait_idle(drain_timeout).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }

        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Dispatcher task failed");
        }
        tracing::info!("Gateway stopped");
    }

    /// Start a session for an accepted socket. Returns false, closing the
    /// socket, when shutdown has already been triggered.
    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, shutdown: &Shutdown) -> bool {
        // Subscribe before checking, so a trigger racing this call is either
        // seen here or delivered to the session.
        let shutdown_rx = shutdown.subscribe();
        if shutdown.is_triggered() {
            tracing::debug!(peer_addr = %peer, "Shutting down, dropping accepted connection");
            return false;
        }

        let guard = self.tracker.track();
        let id = guard.id();
        let conn = ClientConnection::new(stream, peer, id, self.config.listener.max_early_bytes);
        let ctx = Arc::clone(&self.ctx);
        let span = tracing::info_span!("connection", connection_id = %id, peer = %peer);

        tokio::spawn(
            async move {
                let _guard = guard;
                session::run(ctx, conn, shutdown_rx).await;
            }
            .instrument(span),
        );
        true
    }

    /// Swap in the admission limits from a reloaded config. Everything else
    /// needs a restart.
    fn apply_reload(&mut self, new_config: GatewayConfig) {
        if new_config.queue.capacity != self.config.queue.capacity {
            tracing::info!(
                old = self.config.queue.capacity,
                new = new_config.queue.capacity,
                "Queue capacity updated"
            );
            self.ctx.admission.set_capacity(new_config.queue.capacity);
            self.config.queue.capacity = new_config.queue.capacity;
        }

        if new_config.rate_limit != self.config.rate_limit {
            tracing::info!(
                enabled = new_config.rate_limit.enabled,
                attempts_per_second = new_config.rate_limit.attempts_per_second,
                burst_size = new_config.rate_limit.burst_size,
                "Rate limit updated"
            );
            self.ctx.rate_limiter.update(new_config.rate_limit.clone());
            self.config.rate_limit = new_config.rate_limit.clone();
        }

        let mut ignored = Vec::new();
        if new_config.listener != self.config.listener {
            ignored.push("listener");
        }
        if new_config.backend != self.config.backend {
            ignored.push("backend");
        }
        let mut queue = new_config.queue.clone();
        queue.capacity = self.config.queue.capacity;
        if queue != self.config.queue {
            ignored.push("queue");
        }
        if new_config.observability != self.config.observability {
            ignored.push("observability");
        }
        if new_config.shutdown != self.config.shutdown {
            ignored.push("shutdown");
        }
        if !ignored.is_empty() {
            tracing::warn!(sections = ?ignored, "Changes need a restart and were not applied");
        }
    }
}
