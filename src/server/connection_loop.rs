// src/server/connection_loop.rs

//! Runs the listener until it fails or the process is asked to stop.

use super::context::ServerContext;
use crate::core::ProxyError;
use crate::server::ConnectionHandler;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Serves clients and handles graceful shutdown on SIGINT/SIGTERM.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let listener = ctx.listener.clone();
    let handler: Arc<dyn ConnectionHandler> = ctx.handler.clone();
    let mut serve = tokio::spawn(async move { listener.serve(handler).await });

    let outcome: Option<Result<(), ProxyError>> = loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break None;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break None;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => error!("Background task failed: {:#}", e),
                    Err(e) => error!("Background task panicked: {e:?}"),
                }
            },

            res = &mut serve => {
                break Some(res.context("Listener task panicked")?);
            }
        }
    };

    let result = match outcome {
        Some(result) => result,
        None => {
            ctx.listener.close();
            serve.await.context("Listener task panicked")?
        }
    };

    info!("Shutting down. Sending signal to all tasks.");
    let _ = ctx.shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    }

    result.context("Listener stopped with an error")?;
    info!("Proxy shutdown complete.");
    Ok(())
}
