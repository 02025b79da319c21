// src/server/context.rs

use super::listener::Listener;
use crate::config::Config;
use crate::core::ProxyHandler;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the proxy's main loop.
pub struct ServerContext {
    pub config: Arc<Config>,
    pub listener: Arc<Listener>,
    pub handler: Arc<ProxyHandler>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
