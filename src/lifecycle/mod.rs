//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging → Connect store → Start metrics → Bind
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Release queued tickets
//!     → Drain relays → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, store before listener
//! - Shutdown has timeout: exit after the drain deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, StopSignal};
pub use startup::{connect_store, start_metrics};
