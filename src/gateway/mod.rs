//! Gateway subsystem: the service wired together.
//!
//! # Data Flow
//! ```text
//! server.rs (accept)
//!     → session.rs
//!         → security::RateLimiter
//!         → admission::AdmissionController (capacity, enqueue)
//!         → admission::Turn (wait: admitted / hangup / timeout / shutdown)
//!         → forward (dial backend, relay)
//!     → response.rs lines on every refusal
//! ```
//!
//! # Design Decisions
//! - One task per connection, one dispatcher per instance
//! - Every path that leaves the queue without admission releases the ticket

pub mod response;
pub mod server;
pub mod session;

pub use server::GatewayServer;
pub use session::{SessionContext, SessionOutcome};
