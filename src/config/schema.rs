//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the login gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Backend authentication server.
    pub backend: BackendConfig,

    /// Admission queue settings.
    pub queue: QueueConfig,

    /// Per-peer rate limiting of login attempts.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3724").
    pub bind_address: String,

    /// Bytes a queued client may send before admission. They are held and
    /// delivered to the backend first.
    pub max_early_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3724".to_string(),
            max_early_bytes: 64 * 1024,
        }
    }
}

/// Backend authentication server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:3725").
    pub address: String,

    /// Dial timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3725".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which ordered store backs the admission queue.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local deque. Single gateway instance only.
    Memory,
    /// Redis list shared by every gateway instance.
    Redis,
}

/// Admission queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Store implementation.
    pub store: StoreKind,

    /// Redis connection URL (used when `store = "redis"`).
    pub redis_url: String,

    /// Name of the list holding tickets.
    pub key: String,

    /// Queue depth at which new connections are turned away.
    pub capacity: u64,

    /// Pause after finding the queue empty, in milliseconds.
    pub idle_poll_ms: u64,

    /// Pause after putting back another instance's ticket, in milliseconds.
    pub requeue_backoff_ms: u64,

    /// How long a foreign ticket may sit at the head before it is treated as
    /// left behind by a dead instance and dropped.
    pub orphan_timeout_secs: u64,

    /// Upper bound on time spent queued. Unlimited when unset.
    pub max_wait_secs: Option<u64>,

    /// Base delay for backoff after store errors, in milliseconds.
    pub error_backoff_base_ms: u64,

    /// Maximum delay for backoff after store errors, in milliseconds.
    pub error_backoff_max_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Redis,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            key: "login_queue".to_string(),
            capacity: 5000,
            idle_poll_ms: 100,
            requeue_backoff_ms: 500,
            orphan_timeout_secs: 30,
            max_wait_secs: None,
            error_backoff_base_ms: 100,
            error_backoff_max_ms: 5000,
        }
    }
}

impl QueueConfig {
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained login attempts per second per peer IP.
    pub attempts_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            attempts_per_second: 2,
            burst_size: 4,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9100".to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for relays to finish after the acceptor stops.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}
