//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → passed by value to each subsystem at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server applies the new admission limits
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only admission limits are live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, QueueConfig,
    RateLimitConfig, ShutdownConfig, StoreKind,
};
