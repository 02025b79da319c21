// src/connection/endpoint.rs

//! Defines `Endpoint`, a dialable backend address.

use super::context::{Context, DEFAULT_CHANNEL_CAPACITY};
use crate::core::ProxyError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// A backend the proxy opens connections to.
#[derive(Debug, Clone)]
pub struct Endpoint {
    addr: String,
    channel_capacity: usize,
    connect_timeout: Option<Duration>,
}

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: None,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Bounds how long dialing may take. Established connections are not
    /// subject to it.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Opens a TCP connection and wraps it in a `Context`.
    pub async fn connect(&self) -> Result<Context, ProxyError> {
        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(&self.addr))
                .await
                .inspect_err(|_| debug!("Dialing {} timed out after {:?}", self.addr, limit))??,
            None => TcpStream::connect(&self.addr).await?,
        };
        stream.set_nodelay(true)?;
        debug!("Connected to backend {}", self.addr);
        Context::new(stream, self.channel_capacity)
    }
}
