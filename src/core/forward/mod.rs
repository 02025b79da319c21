// src/core/forward/mod.rs

//! The message-forwarding engines that sit between a client and its backends.
//!
//! * [`forward`] relays every message verbatim in both directions.
//! * [`forward_find`] additionally watches for empty `find` results from the
//!   primary and replays the originating query against a fallback backend.

mod failover;
mod passthrough;
pub mod routing;

pub use failover::forward_find;
pub use passthrough::forward;

use crate::core::ProxyError;
use std::fmt;

/// One of the connections an engine services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Primary,
    Fallback,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Primary => "primary",
            Side::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a forwarding loop returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardExit {
    /// The inbound stream of this side ended.
    Closed(Side),
    /// Writing to this side failed.
    SendFailed(Side, ProxyError),
}

impl fmt::Display for ForwardExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardExit::Closed(side) => write!(f, "{side} closed the connection"),
            ForwardExit::SendFailed(side, e) => write!(f, "write to {side} failed: {e}"),
        }
    }
}
