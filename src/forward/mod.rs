//! Forwarding of admitted clients to the backend.
//!
//! # Data Flow
//! ```text
//! Admitted client
//!     → backend.rs (dial, deliver early bytes)
//!     → relay.rs (copy both ways until one side closes)
//! ```
//!
//! # Design Decisions
//! - One backend connection per admitted client
//! - No retry on dial failure: the client is told and closed

pub mod backend;
pub mod relay;

pub use backend::{dial_backend, forward, ForwardError};
pub use relay::{relay, ClosedBy, RelaySummary};
