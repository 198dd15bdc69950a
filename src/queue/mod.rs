//! Admission queue storage.
//!
//! # Data Flow
//! ```text
//! Admission controller
//!     → ticket.rs (allocate unique ticket)
//!     → store.rs (push_head onto the shared list)
//!
//! Dispatcher
//!     → store.rs (pop_tail, push_tail for tickets owned elsewhere)
//!
//! Implementations:
//!     memory.rs (single instance, change notifications)
//!     redis_store.rs (multi-instance, polled)
//! ```
//!
//! # Design Decisions
//! - The store is the only state shared between gateway instances
//! - Only single-command atomicity is assumed

pub mod memory;
pub mod redis_store;
pub mod store;
pub mod ticket;

pub use memory::InMemoryQueueStore;
pub use redis_store::RedisQueueStore;
pub use store::{OrderedQueueStore, StoreError, StoreResult};
pub use ticket::{Ticket, TicketIssuer};
