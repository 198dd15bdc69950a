//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, intervals and limits
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, StoreKind};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for values that would break the gateway at runtime.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_early_bytes == 0 {
        errors.push(ValidationError::new("listener.max_early_bytes", "must be > 0"));
    }

    // Backend may be a host name, so only the host:port shape is checked here.
    match config.backend.address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => errors.push(ValidationError::new(
            "backend.address",
            format!("'{}' is not host:port", config.backend.address),
        )),
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_secs", "must be > 0"));
    }

    let queue = &config.queue;
    if queue.key.trim().is_empty() {
        errors.push(ValidationError::new("queue.key", "must not be empty"));
    }
    if queue.capacity == 0 {
        errors.push(ValidationError::new("queue.capacity", "must be > 0"));
    }
    if queue.store == StoreKind::Redis
        && !(queue.redis_url.starts_with("redis://") || queue.redis_url.starts_with("rediss://"))
    {
        errors.push(ValidationError::new(
            "queue.redis_url",
            "must start with redis:// or rediss://",
        ));
    }
    if queue.idle_poll_ms == 0 {
        errors.push(ValidationError::new("queue.idle_poll_ms", "must be > 0"));
    }
    if queue.requeue_backoff_ms == 0 {
        errors.push(ValidationError::new("queue.requeue_backoff_ms", "must be > 0"));
    }
    if queue.orphan_timeout_secs == 0 {
        errors.push(ValidationError::new("queue.orphan_timeout_secs", "must be > 0"));
    }
    if queue.max_wait_secs == Some(0) {
        errors.push(ValidationError::new("queue.max_wait_secs", "must be > 0 when set"));
    }
    if queue.error_backoff_base_ms == 0 || queue.error_backoff_base_ms > queue.error_backoff_max_ms {
        errors.push(ValidationError::new(
            "queue.error_backoff_base_ms",
            "must be > 0 and not exceed queue.error_backoff_max_ms",
        ));
    }

    if config.rate_limit.enabled
        && (config.rate_limit.attempts_per_second == 0 || config.rate_limit.burst_size == 0)
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "attempts_per_second and burst_size must be > 0 when enabled",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.backend.address = "auth.internal".into();
        config.queue.capacity = 0;
        config.queue.redis_url = "http://localhost".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "backend.address",
                "queue.capacity",
                "queue.redis_url"
            ]
        );
    }

    #[test]
    fn redis_url_ignored_for_memory_store() {
        let mut config = GatewayConfig::default();
        config.queue.store = StoreKind::Memory;
        config.queue.redis_url = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_early_byte_limit_is_rejected() {
        let mut config = GatewayConfig::default();
        config.listener.max_early_bytes = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "listener.max_early_bytes");
    }

    #[test]
    fn backend_accepts_host_names() {
        let mut config = GatewayConfig::default();
        config.backend.address = "auth.internal:3725".into();
        assert!(validate_config(&config).is_ok());
    }
}
