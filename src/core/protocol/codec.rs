// src/core/protocol/codec.rs

//! Implements the `tokio_util::codec` framing for wire messages.

use super::header::{HEADER_LEN, MAX_MESSAGE_SIZE, MessageHeader};
use super::message::Message;
use crate::core::ProxyError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// A `tokio_util::codec` implementation for encoding and decoding `Message`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = Message;
    type Error = ProxyError;

    /// Decodes one frame once all of its bytes are buffered. A partial frame
    /// reserves the missing capacity and returns `Ok(None)`.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = MessageHeader::peek(src) else {
            return Ok(None);
        };

        let len = header.message_length;
        if len < HEADER_LEN as i32 || len as usize > MAX_MESSAGE_SIZE {
            return Err(ProxyError::Protocol(format!(
                "invalid message length {len}"
            )));
        }
        let len = len as usize;

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let message = Message::decode(header, &src[HEADER_LEN..len])?;
        src.advance(len);
        Ok(Some(message))
    }
}

impl Encoder<Message> for WireCodec {
    type Error = ProxyError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

impl Encoder<&Message> for WireCodec {
    type Error = ProxyError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}
