//! Bidirectional byte relay between an admitted client and the backend.
//!
//! # Responsibilities
//! - Copy client bytes to the backend and backend bytes to the client
//! - Tear down both sides as soon as either direction finishes
//! - Report how many bytes went each way

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::observability::metrics;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Which side ended the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedBy {
    Client,
    Backend,
}

/// Outcome of a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
    pub closed_by: ClosedBy,
}

/// Relay until either direction hits EOF or an error, then close both sockets.
pub async fn relay(client: TcpStream, backend: TcpStream) -> RelaySummary {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut backend_read, mut backend_write) = backend.into_split();

    let mut client_to_backend = 0u64;
    let mut backend_to_client = 0u64;

    let closed_by = tokio::select! {
        result = pump(&mut client_read, &mut backend_write, &mut client_to_backend) => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "Client to backend copy failed");
            }
            ClosedBy::Client
        }
        result = pump(&mut backend_read, &mut client_write, &mut backend_to_client) => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "Backend to client copy failed");
            }
            ClosedBy::Backend
        }
    };

    // Best effort: the peer may already be gone.
    let _ = client_write.shutdown().await;
    let _ = backend_write.shutdown().await;

    metrics::record_relayed(client_to_backend, backend_to_client);

    RelaySummary {
        client_to_backend,
        backend_to_client,
        closed_by,
    }
}

/// Copy `from` into `to` until EOF. `copied` is updated per chunk so the
/// count survives cancellation.
async fn pump<R, W>(from: &mut R, to: &mut W, copied: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        to.write_all(&buf[..n]).await?;
        *copied += n as u64;
    }
}
