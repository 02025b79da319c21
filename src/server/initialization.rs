// src/server/initialization.rs

//! Builds the proxy's runtime context from a validated configuration.

use super::context::ServerContext;
use super::listener::Listener;
use crate::config::{Config, ProxyMode};
use crate::core::ProxyHandler;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all proxy components before starting the main loop.
pub fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let handler = Arc::new(ProxyHandler::from_config(&config));
    let listener = Arc::new(Listener::new(
        config.listen_addr(),
        config.channel_capacity,
    ));

    Ok(ServerContext {
        config: Arc::new(config),
        listener,
        handler,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "Primary backend at {}:{}.",
        config.primary.host, config.primary.port
    );
    match config.mode {
        ProxyMode::Failover => info!(
            "Failover mode: empty find results are retried on {}:{} as '{}' ({:?}).",
            config.fallback.host, config.fallback.port, config.fallback.username, config.fallback.mechanism
        ),
        ProxyMode::Passthrough => info!("Passthrough mode: no fallback backend is used."),
    }
    info!(
        "Backend dial timeout {:?}, per-connection buffer of {} messages.",
        config.connect_timeout, config.channel_capacity
    );
}
