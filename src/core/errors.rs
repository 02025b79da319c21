// src/core/errors.rs

//! Defines the primary error type for the proxy.

use crate::core::protocol::OpCode;
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure a connection, a handshake or
/// the listener can run into. Application plumbing (`main`, config loading)
/// wraps these in `anyhow`.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The bytes on the wire do not form a valid frame or document.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An awaited message never arrived because the peer went away.
    #[error("connection closed during {0}")]
    ConnectionClosed(String),

    /// An awaited message arrived with the wrong op code.
    #[error("unexpected reply type: {0:?}")]
    UnexpectedMessage(OpCode),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("reply missing required field '{0}'")]
    MissingField(&'static str),

    #[error("server signature verification failed")]
    SignatureMismatch,

    #[error("invalid SCRAM state: {0}")]
    InvalidState(String),

    #[error("listener has been created already")]
    AlreadyServing,

    #[error("Timed out: {0}")]
    Timeout(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for ProxyError {
    fn clone(&self) -> Self {
        match self {
            ProxyError::Io(e) => ProxyError::Io(Arc::clone(e)),
            ProxyError::Protocol(s) => ProxyError::Protocol(s.clone()),
            ProxyError::ConnectionClosed(s) => ProxyError::ConnectionClosed(s.clone()),
            ProxyError::UnexpectedMessage(op) => ProxyError::UnexpectedMessage(*op),
            ProxyError::Authentication(s) => ProxyError::Authentication(s.clone()),
            ProxyError::MissingField(f) => ProxyError::MissingField(f),
            ProxyError::SignatureMismatch => ProxyError::SignatureMismatch,
            ProxyError::InvalidState(s) => ProxyError::InvalidState(s.clone()),
            ProxyError::AlreadyServing => ProxyError::AlreadyServing,
            ProxyError::Timeout(s) => ProxyError::Timeout(s.clone()),
        }
    }
}

impl PartialEq for ProxyError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProxyError::Io(e1), ProxyError::Io(e2)) => e1.kind() == e2.kind(),
            (ProxyError::Protocol(s1), ProxyError::Protocol(s2)) => s1 == s2,
            (ProxyError::ConnectionClosed(s1), ProxyError::ConnectionClosed(s2)) => s1 == s2,
            (ProxyError::UnexpectedMessage(o1), ProxyError::UnexpectedMessage(o2)) => o1 == o2,
            (ProxyError::Authentication(s1), ProxyError::Authentication(s2)) => s1 == s2,
            (ProxyError::MissingField(f1), ProxyError::MissingField(f2)) => f1 == f2,
            (ProxyError::InvalidState(s1), ProxyError::InvalidState(s2)) => s1 == s2,
            (ProxyError::Timeout(s1), ProxyError::Timeout(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl ProxyError {
    /// True for the errors a peer produces by simply hanging up.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, ProxyError::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Io(Arc::new(e))
    }
}

impl From<FromUtf8Error> for ProxyError {
    fn from(e: FromUtf8Error) -> Self {
        ProxyError::Protocol(format!("invalid UTF-8 in string: {e}"))
    }
}

impl From<base64::DecodeError> for ProxyError {
    fn from(e: base64::DecodeError) -> Self {
        ProxyError::Authentication(format!("invalid base64 in SCRAM message: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        ProxyError::Timeout(format!("dial {e}"))
    }
}
