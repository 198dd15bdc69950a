//! Login gateway library.
//!
//! A TCP front door for an authentication server: connections are admitted
//! through a bounded queue shared by every gateway instance, then spliced
//! byte-for-byte to the backend.

pub mod admission;
pub mod config;
pub mod error;
pub mod forward;
pub mod gateway;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use gateway::GatewayServer;
pub use lifecycle::Shutdown;
