// src/core/protocol/header.rs

//! The fixed 16-byte frame header shared by every wire message.

use bytes::{BufMut, BytesMut};

/// Length of the standard message header in bytes.
pub const HEADER_LEN: usize = 16;

/// Upper bound on a single frame, matching the server's own limit.
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

/// The operation code carried in every message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
    Compressed,
    Msg,
    Unknown(i32),
}

impl From<i32> for OpCode {
    fn from(code: i32) -> Self {
        match code {
            1 => OpCode::Reply,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            2012 => OpCode::Compressed,
            2013 => OpCode::Msg,
            other => OpCode::Unknown(other),
        }
    }
}

impl From<OpCode> for i32 {
    fn from(op: OpCode) -> Self {
        match op {
            OpCode::Reply => 1,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Compressed => 2012,
            OpCode::Msg => 2013,
            OpCode::Unknown(other) => other,
        }
    }
}

/// The standard message header.
///
/// `message_length` is whatever was read off the wire; it is recomputed on
/// serialization, so callers never need to maintain it by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl MessageHeader {
    /// Creates a header for an outbound message. The length is filled in on encode.
    pub fn new(op_code: OpCode, request_id: i32) -> Self {
        Self {
            message_length: 0,
            request_id,
            response_to: 0,
            op_code,
        }
    }

    /// Parses a header from the first 16 bytes of `src`. Returns `None` if
    /// fewer than 16 bytes are available.
    pub fn peek(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_LEN {
            return None;
        }
        let field = |at: usize| i32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]);
        Some(Self {
            message_length: field(0),
            request_id: field(4),
            response_to: field(8),
            op_code: OpCode::from(field(12)),
        })
    }

    /// Writes the header with an explicit total length.
    pub(crate) fn write_to(&self, message_length: i32, dst: &mut BytesMut) {
        dst.put_i32_le(message_length);
        dst.put_i32_le(self.request_id);
        dst.put_i32_le(self.response_to);
        dst.put_i32_le(self.op_code.into());
    }
}
