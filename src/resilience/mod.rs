//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Queue store error while dispatching:
//!     → backoff.rs (exponential delay with jitter before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Store failures are transient; never retry in a tight loop
//! - Jittered backoff prevents instances retrying in lockstep

pub mod backoff;
