// src/core/protocol/mod.rs

//! The binary query/reply wire protocol and its embedded document encoding.

pub mod codec;
pub mod document;
pub mod header;
pub mod message;
pub mod value;

pub use codec::WireCodec;
pub use document::Document;
pub use header::{HEADER_LEN, MAX_MESSAGE_SIZE, MessageHeader, OpCode};
pub use message::{
    ADMIN_COMMAND_NAMESPACE, Message, QueryFlags, QueryMessage, RawMessage, ReplyMessage,
    ResponseFlags,
};
pub use value::{Array, Value};
