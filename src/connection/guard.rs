// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for per-client bookkeeping.

use crate::core::metrics;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::debug;

/// Keeps the connected-clients gauge accurate no matter how a connection task
/// ends, including by panic.
pub struct ConnectionGuard {
    addr: SocketAddr,
    opened_at: Instant,
}

impl ConnectionGuard {
    pub fn new(addr: SocketAddr) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        debug!("Client {} connected.", addr);
        Self {
            addr,
            opened_at: Instant::now(),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "Client {} disconnected after {:?}.",
            self.addr,
            self.opened_at.elapsed()
        );
    }
}
