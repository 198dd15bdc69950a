//! Per-connection handler: rate limit, admission, wait, forward.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::response;
use crate::admission::{Admission, AdmissionController};
use crate::config::BackendConfig;
use crate::forward::{forward, RelaySummary};
use crate::net::{ClientConnection, Departure};
use crate::observability::metrics;
use crate::security::RateLimiter;

/// What a session needs from the server. Shared by every connection.
pub struct SessionContext {
    pub admission: Arc<AdmissionController>,
    pub rate_limiter: Arc<RateLimiter>,
    pub backend: BackendConfig,
    pub max_wait: Option<Duration>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    RateLimited,
    Rejected,
    QueueUnavailable,
    Abandoned,
    EarlyDataLimit,
    TimedOut,
    ShuttingDown,
    BackendUnavailable,
    Relayed(RelaySummary),
}

enum WaitEnd {
    Admitted,
    ClientClosed,
    EarlyDataLimit,
    TimedOut,
    ShuttingDown,
}

/// Drive one client connection to completion.
pub async fn run(
    ctx: Arc<SessionContext>,
    mut conn: ClientConnection,
    mut shutdown: broadcast::Receiver<()>,
) -> SessionOutcome {
    let peer = conn.peer();

    if !ctx.rate_limiter.check(peer.ip()) {
        tracing::info!("Login attempt rate exceeded");
        metrics::record_rejected("rate_limit");
        conn.reject(response::RATE_LIMITED).await;
        return SessionOutcome::RateLimited;
    }

    let mut turn = match ctx.admission.admit(peer).await {
        Ok(Admission::Queued(turn)) => turn,
        Ok(Admission::Rejected { depth, capacity }) => {
            tracing::info!(depth, capacity, "Queue full, connection rejected");
            conn.reject(response::SERVER_FULL).await;
            return SessionOutcome::Rejected;
        }
        Err(e) => {
            tracing::error!(error = %e, "Queue store failed during admission");
            metrics::record_rejected("store_error");
            conn.reject(response::QUEUE_UNAVAILABLE).await;
            return SessionOutcome::QueueUnavailable;
        }
    };

    let deadline = async {
        match ctx.max_wait {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let end = tokio::select! {
        result = turn.admitted() => match result {
            Ok(()) => WaitEnd::Admitted,
            Err(_) => WaitEnd::ShuttingDown,
        },
        closed = conn.closed() => match closed {
            Ok(Departure::HungUp) => WaitEnd::ClientClosed,
            Ok(Departure::EarlyDataLimit) => WaitEnd::EarlyDataLimit,
            Err(e) => {
                tracing::debug!(error = %e, "Client socket failed while queued");
                WaitEnd::ClientClosed
            }
        },
        _ = &mut deadline => WaitEnd::TimedOut,
        _ = shutdown.recv() => WaitEnd::ShuttingDown,
    };

    let waited = turn.waited();
    let (reason, outcome, notice) = match end {
        WaitEnd::Admitted => {
            metrics::record_admitted(waited);
            tracing::info!(
                ticket = %turn.ticket(),
                waited_ms = waited.as_millis() as u64,
                "Admitted"
            );
            return relay_to_backend(conn, &ctx.backend).await;
        }
        WaitEnd::ClientClosed => ("client_closed", SessionOutcome::Abandoned, None),
        WaitEnd::EarlyDataLimit => ("early_data_limit", SessionOutcome::EarlyDataLimit, None),
        WaitEnd::TimedOut => ("timeout", SessionOutcome::TimedOut, Some(response::WAIT_TIMEOUT)),
        WaitEnd::ShuttingDown => ("shutdown", SessionOutcome::ShuttingDown, None),
    };

    // A ticket that is no longer in the store was popped meanwhile; the
    // dispatcher accounts for it.
    let ticket = turn.ticket().clone();
    let removed = turn.release().await;
    if removed {
        metrics::record_abandoned(reason);
    }
    tracing::info!(ticket = %ticket, removed, reason, "Left the queue without admission");

    match notice {
        Some(line) => conn.reject(line).await,
        None => drop(conn),
    }
    outcome
}

async fn relay_to_backend(conn: ClientConnection, backend: &BackendConfig) -> SessionOutcome {
    match forward(conn, backend).await {
        Ok(summary) => {
            tracing::info!(
                client_to_backend = summary.client_to_backend,
                backend_to_client = summary.backend_to_client,
                closed_by = ?summary.closed_by,
                "Relay finished"
            );
            SessionOutcome::Relayed(summary)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Forwarding ended with error");
            SessionOutcome::BackendUnavailable
        }
    }
}
