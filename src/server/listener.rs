// src/server/listener.rs

//! Defines the single-use `Listener` that accepts client connections and hands
//! each one to a `ConnectionHandler` on its own task.

use crate::connection::{ConnectionGuard, Context};
use crate::core::ProxyError;
use crate::core::metrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Serves one accepted client connection.
///
/// The listener owns the `Context` and closes it once `handle` returns, so a
/// handler only has to drive traffic.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, client: &mut Context);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Idle,
    Serving,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Pending,
    Bound(SocketAddr),
    Unbound,
}

/// A TCP listener that can be served exactly once.
pub struct Listener {
    addr: String,
    channel_capacity: usize,
    state: Mutex<ListenerState>,
    shutdown_tx: watch::Sender<bool>,
    bound_tx: watch::Sender<BindState>,
}

impl Listener {
    pub fn new(addr: impl Into<String>, channel_capacity: usize) -> Self {
        Self {
            addr: addr.into(),
            channel_capacity,
            state: Mutex::new(ListenerState::Idle),
            shutdown_tx: watch::Sender::new(false),
            bound_tx: watch::Sender::new(BindState::Pending),
        }
    }

    /// Binds and accepts connections until `close()` is called or accepting
    /// fails. Fails with `AlreadyServing` on every call after the first.
    pub async fn serve(&self, handler: Arc<dyn ConnectionHandler>) -> Result<(), ProxyError> {
        {
            let mut state = self.state.lock();
            if *state != ListenerState::Idle {
                return Err(ProxyError::AlreadyServing);
            }
            *state = ListenerState::Serving;
        }

        let result = self.accept_loop(handler).await;
        *self.state.lock() = ListenerState::Closed;
        self.bound_tx.send_replace(BindState::Unbound);
        result
    }

    async fn accept_loop(&self, handler: Arc<dyn ConnectionHandler>) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local = listener.local_addr()?;
        self.bound_tx.send_replace(BindState::Bound(local));
        info!("Proxy listening on {}", local);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for(|closed| *closed) => {
                    info!("Listener on {} closed.", local);
                    break Ok(());
                }

                res = listener.accept() => match res {
                    Ok((socket, peer)) => {
                        debug!("Accepted new connection from: {}", peer);
                        metrics::CONNECTIONS_ACCEPTED_TOTAL.inc();
                        connections.spawn(serve_connection(
                            socket,
                            peer,
                            self.channel_capacity,
                            handler.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection on {}: {}", local, e);
                        break Err(e.into());
                    }
                },

                Some(res) = connections.join_next() => {
                    if let Err(e) = res
                        && e.is_panic()
                    {
                        error!("A connection handler panicked: {e:?}");
                    }
                }
            }
        };

        // Sessions in flight outlive the listener.
        connections.detach_all();
        result
    }

    /// Stops the accept loop. Closing an idle or already closed listener is a
    /// no-op.
    pub fn close(&self) {
        if *self.state.lock() == ListenerState::Serving {
            self.shutdown_tx.send_replace(true);
        }
    }

    /// Waits until `serve` has bound its socket and returns the bound address,
    /// or `None` if binding failed or the listener has already shut down.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.bound_tx.subscribe();
        let state = rx
            .wait_for(|state| *state != BindState::Pending)
            .await
            .ok()
            .map(|state| *state)?;
        match state {
            BindState::Bound(addr) => Some(addr),
            _ => None,
        }
    }
}

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    channel_capacity: usize,
    handler: Arc<dyn ConnectionHandler>,
) {
    let _guard = ConnectionGuard::new(peer);
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }
    let mut client = match Context::new(socket, channel_capacity) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("Could not set up connection from {}: {}", peer, e);
            return;
        }
    };

    handler.handle(&mut client).await;

    if let Err(e) = client.close().await {
        debug!("Error while closing client {}: {}", peer, e);
    }
}
