//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (id, tracking, hangup detection)
//!     → Hand off to the gateway session
//!
//! Connection States:
//!     Accepted → Queued → Relaying → Closed
//!                   └──→ Rejected / Abandoned → Closed
//! ```
//!
//! # Design Decisions
//! - Accepting never waits on admission
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ClientConnection, ConnectionGuard, ConnectionId, ConnectionTracker, Departure};
pub use listener::{Listener, ListenerError};
