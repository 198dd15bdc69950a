//! Admission subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → controller.rs (count attempt, check depth against capacity)
//!         → full: reject, no ticket
//!         → else: issue ticket, register with dispatcher, push_head
//!     → dispatcher.rs (one task per instance pops the tail and wakes
//!       the waiter whose ticket came out)
//!     → Turn resolves → hand off to the forwarder
//! ```
//!
//! # Design Decisions
//! - Capacity is a time-of-check limit, not a transaction
//! - Waiters sleep on a oneshot; only the dispatcher touches the queue head
//! - A departing waiter removes its own ticket so it never holds a slot

pub mod controller;
pub mod dispatcher;

pub use controller::{Admission, AdmissionController};
pub use dispatcher::{AdmissionError, DispatchTiming, Dispatcher, Turn};
