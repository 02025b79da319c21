// src/core/mod.rs

//! The central module containing the wire protocol, the authentication
//! handshake and the forwarding engines of the proxy.

pub mod auth;
pub mod errors;
pub mod forward;
pub mod metrics;
pub mod protocol;
pub mod proxy;

pub use errors::ProxyError;
pub use protocol::{Document, Message, Value};
pub use proxy::ProxyHandler;
