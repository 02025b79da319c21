// src/main.rs

//! The main entry point for the docproxy application.

use anyhow::{Result, anyhow};
use docproxy::config::Config;
use docproxy::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("docproxy version {VERSION}");
        return Ok(());
    }

    // The config path can be provided via --config; otherwise "docproxy.toml"
    // is tried and the defaults are used when it does not exist.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("docproxy.toml");

    let mut config = match Config::load_or_default(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    // Override port if provided as a command-line argument.
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        let port = args
            .get(port_index + 1)
            .ok_or_else(|| anyhow!("--port flag requires a value"))?;
        config.port = port
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid port number: {port}"))?;
        config.validate()?;
    }

    // Log level comes from RUST_LOG when set, else from the config.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();

    info!("Starting docproxy {} on {}", VERSION, config.listen_addr());

    if let Err(e) = server::run(config).await {
        error!("Proxy runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
