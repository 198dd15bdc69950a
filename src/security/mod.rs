//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → rate_limit.rs (check per-IP attempt rate)
//!     → Admission queue
//! ```
//!
//! # Design Decisions
//! - Limited attempts are turned away before they count as login attempts
//! - Off by default

pub mod rate_limit;

pub use rate_limit::RateLimiter;
