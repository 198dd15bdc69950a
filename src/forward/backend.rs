//! Backend dialing and the handoff from queue to relay.

use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::relay::{relay, RelaySummary};
use crate::config::BackendConfig;
use crate::gateway::response;
use crate::net::ClientConnection;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend {addr} unreachable: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend {addr} did not answer within {secs}s")]
    DialTimeout { addr: String, secs: u64 },

    #[error("failed to deliver buffered client bytes: {0}")]
    Io(#[from] std::io::Error),
}

/// Open a connection to the backend, giving up after `timeout`.
pub async fn dial_backend(addr: &str, timeout: Duration) -> Result<TcpStream, ForwardError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(backend = %addr, error = %e, "Failed to set TCP_NODELAY");
            }
            Ok(stream)
        }
        Ok(Err(source)) => Err(ForwardError::Dial {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ForwardError::DialTimeout {
            addr: addr.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

/// Connect an admitted client to the backend and relay until either side closes.
///
/// When the backend cannot be reached the client is told so and closed.
/// Bytes the client sent while queued are written to the backend before
/// anything else.
pub async fn forward(
    client: ClientConnection,
    backend: &BackendConfig,
) -> Result<RelaySummary, ForwardError> {
    let mut upstream = match dial_backend(&backend.address, backend.connect_timeout()).await {
        Ok(stream) => stream,
        Err(e) => {
            metrics::record_dial_failure();
            tracing::warn!(backend = %backend.address, error = %e, "Backend dial failed");
            client.reject(response::BACKEND_UNAVAILABLE).await;
            return Err(e);
        }
    };

    let (stream, early) = client.into_parts();
    if !early.is_empty() {
        upstream.write_all(&early).await?;
    }

    let mut summary = relay(stream, upstream).await;
    summary.client_to_backend += early.len() as u64;
    Ok(summary)
}
