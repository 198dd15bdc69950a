//! Admission tickets.
//!
//! A ticket is the only thing stored in the shared queue. Its text is
//! `{peer}#{instance}-{seq}`: the instance id is random per process and the
//! sequence is an atomic counter, so two tickets never collide across
//! instances even when peers share an address or the clock is coarse.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque claim to a position in the admission queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(String);

impl Ticket {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Ticket {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocates tickets for one gateway instance.
#[derive(Debug)]
pub struct TicketIssuer {
    instance: String,
    next: AtomicU64,
}

impl TicketIssuer {
    pub fn new() -> Self {
        let mut instance = uuid::Uuid::new_v4().simple().to_string();
        instance.truncate(12);
        Self {
            instance,
            next: AtomicU64::new(1),
        }
    }

    /// Id embedded in every ticket issued by this instance.
    pub fn instance_id(&self) -> &str {
        &self.instance
    }

    pub fn issue(&self, peer: SocketAddr) -> Ticket {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        Ticket(format!("{}#{}-{}", peer, self.instance, seq))
    }
}

impl Default for TicketIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_peer_gets_distinct_tickets() {
        let issuer = TicketIssuer::new();
        let peer: SocketAddr = "10.1.2.3:50000".parse().unwrap();

        let tickets: HashSet<_> = (0..1000).map(|_| issuer.issue(peer)).collect();
        assert_eq!(tickets.len(), 1000);
    }

    #[test]
    fn instances_never_collide() {
        let a = TicketIssuer::new();
        let b = TicketIssuer::new();
        let peer: SocketAddr = "10.1.2.3:50000".parse().unwrap();

        assert_ne!(a.instance_id(), b.instance_id());
        assert_ne!(a.issue(peer), b.issue(peer));
    }

    #[test]
    fn ticket_names_its_peer() {
        let issuer = TicketIssuer::new();
        let ticket = issuer.issue("192.168.0.9:4242".parse().unwrap());
        assert!(ticket.as_str().starts_with("192.168.0.9:4242#"));
        assert!(ticket.as_str().contains(issuer.instance_id()));
    }
}
