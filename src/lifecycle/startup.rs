//! Startup orchestration helpers.
//!
//! # Responsibilities
//! - Connect the configured queue store and confirm it answers
//! - Start the metrics exporter without letting it take the gateway down
//!
//! # Design Decisions
//! - Fail fast: an unreachable store is fatal
//! - The metrics exporter is optional; its failure is logged only

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{ObservabilityConfig, QueueConfig, StoreKind};
use crate::observability::metrics;
use crate::queue::{InMemoryQueueStore, OrderedQueueStore, RedisQueueStore, StoreResult};

/// Build the queue store named by the config.
pub async fn connect_store(config: &QueueConfig) -> StoreResult<Arc<dyn OrderedQueueStore>> {
    match config.store {
        StoreKind::Memory => {
            tracing::info!("Using in-memory queue store (single instance only)");
            Ok(Arc::new(InMemoryQueueStore::new()))
        }
        StoreKind::Redis => {
            let store = RedisQueueStore::connect(&config.redis_url).await?;
            tracing::info!(url = %config.redis_url, key = %config.key, "Connected to Redis queue store");
            Ok(Arc::new(store))
        }
    }
}

/// Start the Prometheus exporter if enabled. Returns whether it is running.
pub fn start_metrics(config: &ObservabilityConfig) -> bool {
    if !config.metrics_enabled {
        tracing::info!("Metrics exporter disabled");
        return false;
    }

    let addr: SocketAddr = match config.metrics_address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(
                metrics_address = %config.metrics_address,
                error = %e,
                "Failed to parse metrics address, continuing without metrics"
            );
            return false;
        }
    };

    match metrics::init_metrics(addr) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Metrics exporter failed to start, continuing without metrics");
            false
        }
    }
}
