//! Per-instance admission dispatcher.
//!
//! Connections never poll the queue themselves. Each gateway instance runs
//! one dispatcher task that owns every pop this instance makes:
//!
//! ```text
//! pop_tail
//!   ├─ empty            → wait for a store change (or idle_poll) and retry
//!   ├─ ticket is ours   → signal its waiter; the ticket is consumed
//!   ├─ ours, waiter gone→ drop it; the ticket is consumed
//!   └─ someone else's   → push_tail (back to the head of the line),
//!                         wait requeue_backoff; drop it instead once it has
//!                         sat at the head longer than orphan_timeout
//! ```
//!
//! With one instance and the in-memory store this is strict FIFO. With
//! several instances on a shared store it is best-effort FIFO: while one
//! instance holds a foreign ticket between its pop and its push back, the
//! ticket's owner can pop the next ticket and pass it over, so neighbours
//! may swap places. Every displacement needs such a collision, so a ticket
//! is displaced at most once per concurrent collision during its wait, and
//! each ticket is still admitted as long as its owner keeps running.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, watch, Notify};

use crate::config::QueueConfig;
use crate::observability::metrics;
use crate::queue::{OrderedQueueStore, StoreResult, Ticket};
use crate::resilience::backoff::Backoff;

/// Error returned to a waiter whose turn can no longer come.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("dispatcher stopped before the ticket was admitted")]
    DispatcherClosed,
}

/// Timing knobs for the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTiming {
    pub idle_poll: Duration,
    pub requeue_backoff: Duration,
    pub orphan_timeout: Duration,
    pub error_backoff: Backoff,
}

impl DispatchTiming {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            idle_poll: Duration::from_millis(config.idle_poll_ms),
            requeue_backoff: Duration::from_millis(config.requeue_backoff_ms),
            orphan_timeout: Duration::from_secs(config.orphan_timeout_secs),
            error_backoff: Backoff::from_millis(
                config.error_backoff_base_ms,
                config.error_backoff_max_ms,
            ),
        }
    }
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Outcome of one pop.
#[derive(Debug)]
enum Step {
    Empty,
    Admitted(Ticket),
    Discarded(Ticket),
    Requeued(Ticket),
    Orphaned(Ticket),
}

enum Pause {
    UntilChange(Duration),
    Fixed(Duration),
}

/// Foreign ticket currently observed at the head, and since when.
type HeadSighting = Option<(Ticket, Instant)>;

pub struct Dispatcher {
    store: Arc<dyn OrderedQueueStore>,
    key: String,
    timing: DispatchTiming,
    waiters: DashMap<Ticket, oneshot::Sender<()>>,
    registered: Notify,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn OrderedQueueStore>, key: impl Into<String>, timing: DispatchTiming) -> Self {
        Self {
            store,
            key: key.into(),
            timing,
            waiters: DashMap::new(),
            registered: Notify::new(),
        }
    }

    /// Number of local tickets the dispatcher is still watching for.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Claim a ticket before it is pushed, so the dispatcher recognises it
    /// as local the moment it reaches the head.
    pub fn register(self: &Arc<Self>, ticket: Ticket) -> Turn {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(ticket.clone(), tx);
        self.registered.notify_one();
        Turn {
            ticket,
            rx,
            dispatcher: Arc::clone(self),
            enqueued_at: Instant::now(),
            settled: false,
        }
    }

    /// Run until shutdown. Pending turns fail with `DispatcherClosed` afterwards.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut changes = self.store.changes();
        let mut head: HeadSighting = None;
        let mut failures: u32 = 0;

        tracing::info!(
            queue = %self.key,
            signalled = changes.is_some(),
            "Dispatcher started"
        );

        loop {
            if self.waiters.is_empty() {
                tokio::select! {
                    _ = self.registered.notified() => continue,
                    _ = shutdown.recv() => break,
                }
            }

            if let Some(rx) = changes.as_mut() {
                rx.borrow_and_update();
            }

            let pause = match self.step(&mut head).await {
                Ok(step) => {
                    failures = 0;
                    match step {
                        Step::Admitted(ticket) => {
                            tracing::debug!(ticket = %ticket, "Ticket admitted");
                            continue;
                        }
                        Step::Discarded(ticket) => {
                            tracing::debug!(ticket = %ticket, "Dropped ticket of departed client");
                            metrics::record_abandoned("departed");
                            continue;
                        }
                        Step::Orphaned(ticket) => {
                            tracing::warn!(
                                ticket = %ticket,
                                orphan_timeout = ?self.timing.orphan_timeout,
                                "Dropped foreign ticket stuck at head of queue"
                            );
                            metrics::record_abandoned("orphaned");
                            continue;
                        }
                        Step::Empty => {
                            self.waiters.retain(|_, tx| !tx.is_closed());
                            Pause::UntilChange(self.timing.idle_poll)
                        }
                        Step::Requeued(ticket) => {
                            tracing::trace!(ticket = %ticket, "Put back foreign ticket");
                            Pause::Fixed(self.timing.requeue_backoff)
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.timing.error_backoff.delay(failures);
                    tracing::warn!(error = %e, attempt = failures, delay = ?delay, "Queue store error while dispatching");
                    Pause::Fixed(delay)
                }
            };

            tokio::select! {
                _ = wait(pause, changes.as_mut()) => {}
                _ = shutdown.recv() => break,
            }
        }

        // Dropping the senders fails every pending turn.
        self.waiters.clear();
        tracing::info!(queue = %self.key, "Dispatcher stopped");
    }

    async fn step(&self, head: &mut HeadSighting) -> StoreResult<Step> {
        let Some(raw) = self.store.pop_tail(&self.key).await? else {
            return Ok(Step::Empty);
        };
        let ticket = Ticket::from(raw);

        if let Some((_, waiter)) = self.waiters.remove(&ticket) {
            *head = None;
            return Ok(if waiter.send(()).is_ok() {
                Step::Admitted(ticket)
            } else {
                Step::Discarded(ticket)
            });
        }

        let now = Instant::now();
        let stuck_since = head
            .as_ref()
            .filter(|(seen, _)| *seen == ticket)
            .map(|(_, since)| *since);
        match stuck_since {
            Some(since) if now.duration_since(since) >= self.timing.orphan_timeout => {
                *head = None;
                return Ok(Step::Orphaned(ticket));
            }
            Some(_) => {}
            None => *head = Some((ticket.clone(), now)),
        }

        if let Err(e) = self.store.push_tail(&self.key, ticket.as_str()).await {
            tracing::error!(ticket = %ticket, error = %e, "Failed to put back foreign ticket, it is lost");
            return Err(e);
        }
        Ok(Step::Requeued(ticket))
    }

    /// Take a ticket out of the queue on behalf of a departing waiter.
    ///
    /// The waiter entry stays registered unless the store removal found the
    /// ticket: if the ticket is in flight (popped by this or another instance)
    /// the dispatcher must still recognise it and drop it rather than put it back.
    async fn release(&self, ticket: &Ticket) -> bool {
        match self.store.remove(&self.key, ticket.as_str()).await {
            Ok(removed) if removed > 0 => {
                self.waiters.remove(ticket);
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(
                    ticket = %ticket,
                    error = %e,
                    "Failed to release ticket, it will be dropped when it reaches the head"
                );
                false
            }
        }
    }

    fn forget(&self, ticket: &Ticket) {
        self.waiters.remove(ticket);
    }
}

async fn wait(pause: Pause, changes: Option<&mut watch::Receiver<u64>>) {
    match (pause, changes) {
        (Pause::UntilChange(limit), Some(rx)) => {
            let _ = tokio::time::timeout(limit, rx.changed()).await;
        }
        (Pause::UntilChange(delay), None) | (Pause::Fixed(delay), _) => {
            tokio::time::sleep(delay).await;
        }
    }
}

/// A waiter's handle on its queued ticket.
///
/// Dropping a turn that was neither admitted nor released releases the
/// ticket from a background task.
pub struct Turn {
    ticket: Ticket,
    rx: oneshot::Receiver<()>,
    dispatcher: Arc<Dispatcher>,
    enqueued_at: Instant,
    settled: bool,
}

impl Turn {
    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// Time since the ticket was registered.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Resolve once the dispatcher pops this ticket. Cancel safe.
    pub async fn admitted(&mut self) -> Result<(), AdmissionError> {
        (&mut self.rx)
            .await
            .map_err(|_| AdmissionError::DispatcherClosed)?;
        self.settled = true;
        Ok(())
    }

    /// Give up the position. Returns whether the ticket was found in the queue.
    pub async fn release(mut self) -> bool {
        if self.settled {
            return false;
        }
        self.rx.close();
        let removed = self.dispatcher.release(&self.ticket).await;
        self.settled = true;
        removed
    }

    /// Undo a registration whose ticket never made it into the store.
    pub(crate) fn cancel_unqueued(mut self) {
        self.dispatcher.forget(&self.ticket);
        self.settled = true;
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let ticket = self.ticket.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                dispatcher.release(&ticket).await;
            });
        }
    }
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("ticket", &self.ticket)
            .field("settled", &self.settled)
            .finish()
    }
}
