// src/connection/context.rs

//! Defines `Context`, the message-level view of one TCP connection.
//!
//! Reading is decoupled from the consumer: a dedicated read pump decodes frames
//! off the socket and pushes them into a bounded channel, while the owner of
//! the `Context` writes directly to the socket. A slow consumer therefore
//! applies back-pressure to the peer once the channel fills up.

use crate::core::ProxyError;
use crate::core::protocol::{Message, WireCodec};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Capacity of the inbound message channel when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A bidirectional, message-oriented connection.
///
/// `next()` yields decoded inbound messages in arrival order and returns `None`
/// once the peer disconnected, a frame failed to decode, or the context was
/// closed. Only the owner writes, so no write lock is needed.
pub struct Context {
    peer: SocketAddr,
    writer: Option<FramedWrite<OwnedWriteHalf, WireCodec>>,
    inbound: mpsc::Receiver<Message>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl Context {
    /// Wraps a connected socket and starts its read pump.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(stream: TcpStream, channel_capacity: usize) -> Result<Self, ProxyError> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let pump = tokio::spawn(read_pump(read_half, tx, peer));

        Ok(Self {
            peer,
            writer: Some(FramedWrite::new(write_half, WireCodec)),
            inbound: rx,
            pump: Some(pump),
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receives the next inbound message.
    pub async fn next(&mut self) -> Option<Message> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await
    }

    /// Encodes `message` and writes the whole frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), ProxyError> {
        let writer = self.writer_mut()?;
        writer.send(message).await
    }

    /// Writes pre-encoded bytes as-is. Used to relay frames without re-framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProxyError> {
        let writer = self.writer_mut()?;
        let socket = writer.get_mut();
        socket.write_all(bytes).await?;
        socket.flush().await?;
        Ok(())
    }

    /// Stops the read pump and shuts the socket down. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<(), ProxyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inbound.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        match writer.get_mut().shutdown().await {
            Ok(()) => Ok(()),
            // The peer beat us to it.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn writer_mut(&mut self) -> Result<&mut FramedWrite<OwnedWriteHalf, WireCodec>, ProxyError> {
        self.writer.as_mut().ok_or_else(|| {
            ProxyError::Io(
                io::Error::new(io::ErrorKind::NotConnected, "context is closed").into(),
            )
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Decodes frames until EOF, a decode error, or the receiver going away.
async fn read_pump(read_half: OwnedReadHalf, tx: mpsc::Sender<Message>, peer: SocketAddr) {
    let mut framed = FramedRead::new(read_half, WireCodec);
    while let Some(result) = framed.next().await {
        match result {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) if e.is_normal_disconnect() => {
                debug!("Connection {} reset: {}", peer, e);
                break;
            }
            Err(e) => {
                warn!("Dropping connection {} after read error: {}", peer, e);
                break;
            }
        }
    }
    debug!("Read pump for {} finished.", peer);
}
