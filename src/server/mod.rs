// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod listener;
pub mod metrics_server;
mod spawner;

pub use context::ServerContext;
pub use listener::{ConnectionHandler, Listener};

/// The main proxy startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Build the handler and listener from the configuration.
    let mut server_context = initialization::setup(config)?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Serve clients until shutdown.
    connection_loop::run(server_context).await
}
