// src/connection/mod.rs

//! Connection plumbing: the message-oriented `Context`, backend `Endpoint`s and
//! the RAII guard that tracks connected clients.

mod context;
mod endpoint;
mod guard;

pub use context::{Context, DEFAULT_CHANNEL_CAPACITY};
pub use endpoint::Endpoint;
pub use guard::ConnectionGuard;
