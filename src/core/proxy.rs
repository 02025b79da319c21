// src/core/proxy.rs

//! Defines `ProxyHandler`, which wires one client connection to its backends.

use crate::config::{Config, ProxyMode};
use crate::connection::{Context, Endpoint};
use crate::core::auth::{Credentials, MechanismPreference, authenticate_with};
use crate::core::forward::{ForwardExit, forward, forward_find};
use crate::core::metrics;
use crate::server::ConnectionHandler;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-connection behavior of the proxy.
///
/// Each client gets its own primary connection and, in failover mode, its own
/// authenticated fallback connection. Nothing is shared between clients.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    mode: ProxyMode,
    primary: Endpoint,
    fallback: Endpoint,
    credentials: Credentials,
    mechanism: MechanismPreference,
}

impl ProxyHandler {
    pub fn new(
        mode: ProxyMode,
        primary: Endpoint,
        fallback: Endpoint,
        credentials: Credentials,
        mechanism: MechanismPreference,
    ) -> Self {
        Self {
            mode,
            primary,
            fallback,
            credentials,
            mechanism,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.mode,
            config.primary_endpoint(),
            config.fallback_endpoint(),
            config.fallback.credentials(),
            config.fallback.mechanism,
        )
    }

    /// Dials and authenticates the fallback. `None` puts the connection in
    /// degraded mode.
    async fn open_fallback(&self, client: SocketAddr) -> Option<Context> {
        let started = Instant::now();
        let mut fallback = match self.fallback.connect().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(
                    "Fallback {} unreachable for client {}: {}. Serving from primary only.",
                    self.fallback.addr(),
                    client,
                    e
                );
                metrics::FALLBACK_UNAVAILABLE_TOTAL
                    .with_label_values(&["dial"])
                    .inc();
                return None;
            }
        };

        match authenticate_with(&mut fallback, &self.credentials, self.mechanism).await {
            Ok(mechanism) => {
                metrics::FALLBACK_HANDSHAKE_SECONDS.observe(started.elapsed().as_secs_f64());
                debug!(
                    "Fallback session for {} ready ({}).",
                    client,
                    mechanism.name()
                );
                Some(fallback)
            }
            Err(e) => {
                warn!(
                    "Authentication to fallback {} failed for client {}: {}. Serving from primary only.",
                    self.fallback.addr(),
                    client,
                    e
                );
                metrics::FALLBACK_UNAVAILABLE_TOTAL
                    .with_label_values(&["auth"])
                    .inc();
                close_quietly(&mut fallback).await;
                None
            }
        }
    }
}

#[async_trait]
impl ConnectionHandler for ProxyHandler {
    async fn handle(&self, client: &mut Context) {
        let peer = client.peer_addr();
        let mut primary = match self.primary.connect().await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(
                    "Cannot reach primary {} for client {}: {}",
                    self.primary.addr(),
                    peer,
                    e
                );
                return;
            }
        };

        let exit = match self.mode {
            ProxyMode::Passthrough => forward(client, &mut primary).await,
            ProxyMode::Failover => {
                let mut fallback = self.open_fallback(peer).await;
                let exit = forward_find(client, &mut primary, fallback.as_mut()).await;
                if let Some(ctx) = fallback.as_mut() {
                    close_quietly(ctx).await;
                }
                exit
            }
        };
        close_quietly(&mut primary).await;

        match &exit {
            ForwardExit::Closed(_) => info!("Session for {} ended: {}.", peer, exit),
            ForwardExit::SendFailed(..) => warn!("Session for {} aborted: {}.", peer, exit),
        }
    }
}

async fn close_quietly(ctx: &mut Context) {
    if let Err(e) = ctx.close().await {
        debug!("Error while closing connection to {}: {}", ctx.peer_addr(), e);
    }
}
