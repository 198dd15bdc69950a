//! Fixed notice lines written to clients before closing.

/// Queue at capacity.
pub const SERVER_FULL: &str = "Server is full. Try again later.\n";

/// Backend dial failed or timed out.
pub const BACKEND_UNAVAILABLE: &str = "Authserver is down. Try later.\n";

/// Queue store failed during the admission check.
pub const QUEUE_UNAVAILABLE: &str = "Login queue unavailable. Try later.\n";

/// `queue.max_wait_secs` elapsed before admission.
pub const WAIT_TIMEOUT: &str = "Queue wait timed out. Try again later.\n";

/// Peer exceeded its login attempt rate.
pub const RATE_LIMITED: &str = "Too many login attempts. Slow down.\n";
