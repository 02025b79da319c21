// src/core/protocol/message.rs

//! Defines the typed wire messages exchanged with clients and backends.
//!
//! Only the legacy query/reply pair is inspected by the proxy. Every other op
//! code is carried as an opaque body so that it can still be relayed.

use super::document::{Document, WireReader, put_cstring, read_document, write_document};
use super::header::{HEADER_LEN, MAX_MESSAGE_SIZE, MessageHeader, OpCode};
use crate::core::ProxyError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

/// The namespace that administrative commands are addressed to.
pub const ADMIN_COMMAND_NAMESPACE: &str = "admin.$cmd";

bitflags! {
    /// Flags carried by a query request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryFlags: i32 {
        const TAILABLE_CURSOR   = 1 << 1;
        const SLAVE_OK          = 1 << 2;
        const OPLOG_REPLAY      = 1 << 3;
        const NO_CURSOR_TIMEOUT = 1 << 4;
        const AWAIT_DATA        = 1 << 5;
        const EXHAUST           = 1 << 6;
        const PARTIAL           = 1 << 7;
    }
}

bitflags! {
    /// Flags carried by a reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResponseFlags: i32 {
        const CURSOR_NOT_FOUND   = 1 << 0;
        const QUERY_FAILURE      = 1 << 1;
        const SHARD_CONFIG_STALE = 1 << 2;
        const AWAIT_CAPABLE      = 1 << 3;
    }
}

/// A query request (`OP_QUERY`).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMessage {
    pub header: MessageHeader,
    pub flags: QueryFlags,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    /// Negative means "return this many and close the cursor"; `-1` returns a
    /// single batch, which is how commands are issued.
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl QueryMessage {
    pub fn new(full_collection_name: impl Into<String>, query: Document) -> Self {
        Self {
            header: MessageHeader::new(OpCode::Query, 0),
            flags: QueryFlags::empty(),
            full_collection_name: full_collection_name.into(),
            number_to_skip: 0,
            number_to_return: 0,
            query,
            return_fields_selector: None,
        }
    }

    /// Builds an administrative command addressed to `admin.$cmd` with
    /// "return all, close cursor" semantics.
    pub fn command(command: Document) -> Self {
        let mut query = Self::new(ADMIN_COMMAND_NAMESPACE, command);
        query.number_to_return = -1;
        query
    }

    /// Same as [`QueryMessage::command`] but addressed to `<database>.$cmd`.
    pub fn command_on(database: &str, command: Document) -> Self {
        let mut query = Self::command(command);
        query.full_collection_name = format!("{database}.$cmd");
        query
    }

    fn decode_body(header: MessageHeader, body: &[u8]) -> Result<Self, ProxyError> {
        let mut r = WireReader::new(body);
        let flags = QueryFlags::from_bits_retain(r.read_i32()?);
        let full_collection_name = r.read_cstring()?;
        let number_to_skip = r.read_i32()?;
        let number_to_return = r.read_i32()?;
        let query = read_document(&mut r, 0)?;
        let return_fields_selector = if r.is_empty() {
            None
        } else {
            Some(read_document(&mut r, 0)?)
        };
        if !r.is_empty() {
            return Err(ProxyError::Protocol(format!(
                "{} trailing bytes after query",
                r.remaining()
            )));
        }
        Ok(Self {
            header,
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.flags.bits());
        put_cstring(&self.full_collection_name, dst);
        dst.put_i32_le(self.number_to_skip);
        dst.put_i32_le(self.number_to_return);
        write_document(&self.query, dst);
        if let Some(selector) = &self.return_fields_selector {
            write_document(selector, dst);
        }
    }
}

/// A reply (`OP_REPLY`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMessage {
    pub header: MessageHeader,
    pub response_flags: ResponseFlags,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
    pub documents: Vec<Document>,
}

impl ReplyMessage {
    /// Builds a reply carrying `documents`, answering request `response_to`.
    pub fn new(response_to: i32, documents: Vec<Document>) -> Self {
        let mut header = MessageHeader::new(OpCode::Reply, 0);
        header.response_to = response_to;
        Self {
            header,
            response_flags: ResponseFlags::empty(),
            cursor_id: 0,
            starting_from: 0,
            number_returned: documents.len() as i32,
            documents,
        }
    }

    /// The first document, which holds the command result.
    pub fn first_document(&self) -> Option<&Document> {
        self.documents.first()
    }

    fn decode_body(header: MessageHeader, body: &[u8]) -> Result<Self, ProxyError> {
        let mut r = WireReader::new(body);
        let response_flags = ResponseFlags::from_bits_retain(r.read_i32()?);
        let cursor_id = r.read_i64()?;
        let starting_from = r.read_i32()?;
        let number_returned = r.read_i32()?;
        let mut documents = Vec::new();
        while !r.is_empty() {
            documents.push(read_document(&mut r, 0)?);
        }
        Ok(Self {
            header,
            response_flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.response_flags.bits());
        dst.put_i64_le(self.cursor_id);
        dst.put_i32_le(self.starting_from);
        dst.put_i32_le(self.number_returned);
        for doc in &self.documents {
            write_document(doc, dst);
        }
    }
}

/// Any message the proxy does not inspect, kept as its raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub header: MessageHeader,
    pub body: Bytes,
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Query(QueryMessage),
    Reply(ReplyMessage),
    Other(RawMessage),
}

impl Message {
    /// Decodes a message from its header and the body bytes that follow it.
    pub fn decode(header: MessageHeader, body: &[u8]) -> Result<Self, ProxyError> {
        match header.op_code {
            OpCode::Query => Ok(Message::Query(QueryMessage::decode_body(header, body)?)),
            OpCode::Reply => Ok(Message::Reply(ReplyMessage::decode_body(header, body)?)),
            _ => Ok(Message::Other(RawMessage {
                header,
                body: Bytes::copy_from_slice(body),
            })),
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            Message::Query(q) => &q.header,
            Message::Reply(r) => &r.header,
            Message::Other(o) => &o.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        match self {
            Message::Query(q) => &mut q.header,
            Message::Reply(r) => &mut r.header,
            Message::Other(o) => &mut o.header,
        }
    }

    pub fn request_id(&self) -> i32 {
        self.header().request_id
    }

    pub fn set_request_id(&mut self, request_id: i32) {
        self.header_mut().request_id = request_id;
    }

    pub fn op_code(&self) -> OpCode {
        self.header().op_code
    }

    pub fn as_query(&self) -> Option<&QueryMessage> {
        match self {
            Message::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_reply(&self) -> Option<&ReplyMessage> {
        match self {
            Message::Reply(r) => Some(r),
            _ => None,
        }
    }

    /// Appends the full frame to `dst`, recomputing `message_length`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), ProxyError> {
        let start = dst.len();
        // The length is back-filled once the body size is known.
        self.header().write_to(0, dst);
        match self {
            Message::Query(q) => q.encode_body(dst),
            Message::Reply(r) => r.encode_body(dst),
            Message::Other(o) => dst.extend_from_slice(&o.body),
        }
        let len = dst.len() - start;
        if len > MAX_MESSAGE_SIZE {
            dst.truncate(start);
            return Err(ProxyError::Protocol(format!(
                "message of {len} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit"
            )));
        }
        dst[start..start + 4].copy_from_slice(&(len as i32).to_le_bytes());
        Ok(())
    }

    /// Serializes the message into a standalone frame.
    pub fn serialize(&self) -> Result<Bytes, ProxyError> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 64);
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }
}

impl From<QueryMessage> for Message {
    fn from(q: QueryMessage) -> Self {
        Message::Query(q)
    }
}

impl From<ReplyMessage> for Message {
    fn from(r: ReplyMessage) -> Self {
        Message::Reply(r)
    }
}
