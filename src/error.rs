//! Top-level errors that stop the gateway at startup.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::ListenerError;
use crate::queue::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("queue store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
