// src/core/protocol/document.rs

//! Implements the ordered key/value document and its binary encoding.
//!
//! A document on the wire is an `i32` total length, a sequence of elements
//! (type tag, NUL-terminated key, value) and a trailing `0x00`. Decoding and
//! encoding are exact inverses, which is what lets the proxy inspect a message
//! and still forward it byte-for-byte.

use super::value::{Array, Value, tag};
use crate::core::ProxyError;
use bytes::{BufMut, Bytes, BytesMut};

/// Limit nesting to keep recursion bounded on hostile input.
const MAX_DOCUMENT_DEPTH: usize = 128;

/// An ordered sequence of (key, value) pairs. Keys are not deduplicated;
/// lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, convenient for constructing command documents.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// Appends a pair without checking for an existing key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Returns the first value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The key of the first element, which names the command in a command document.
    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
    }

    // --- Typed getters built on the `Value` coercion helpers ---

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(Value::as_i32)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_binary(&self, key: &str) -> Option<&Bytes> {
        self.get(key).and_then(Value::as_binary)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    /// Encodes the document into a standalone byte buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        write_document(self, &mut buf);
        buf.freeze()
    }

    /// Decodes exactly one document occupying all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProxyError> {
        let mut reader = WireReader::new(bytes);
        let doc = read_document(&mut reader, 0)?;
        if !reader.is_empty() {
            return Err(ProxyError::Protocol(format!(
                "{} trailing bytes after document",
                reader.remaining()
            )));
        }
        Ok(doc)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A bounds-checked little-endian reader over a byte slice. Every read that
/// would run past the end reports a protocol error instead of panicking.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ProxyError> {
        if self.buf.len() < n {
            return Err(ProxyError::Protocol(format!(
                "truncated input: wanted {n} bytes, {} left",
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProxyError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ProxyError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, ProxyError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, ProxyError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, ProxyError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_f64(&mut self) -> Result<f64, ProxyError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads a NUL-terminated string.
    pub(crate) fn read_cstring(&mut self) -> Result<String, ProxyError> {
        let Some(pos) = self.buf.iter().position(|&b| b == 0) else {
            return Err(ProxyError::Protocol("unterminated cstring".into()));
        };
        let s = String::from_utf8(self.buf[..pos].to_vec())?;
        self.buf = &self.buf[pos + 1..];
        Ok(s)
    }

    /// Reads a length-prefixed string whose length includes the trailing NUL.
    fn read_string(&mut self) -> Result<String, ProxyError> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(ProxyError::Protocol(format!("invalid string length {len}")));
        }
        let raw = self.take(len as usize)?;
        let Some((&0, body)) = raw.split_last() else {
            return Err(ProxyError::Protocol("string not NUL-terminated".into()));
        };
        Ok(String::from_utf8(body.to_vec())?)
    }
}

/// Decodes one document from the reader.
pub(crate) fn read_document(
    reader: &mut WireReader<'_>,
    depth: usize,
) -> Result<Document, ProxyError> {
    if depth > MAX_DOCUMENT_DEPTH {
        return Err(ProxyError::Protocol(
            "document nesting depth limit exceeded".into(),
        ));
    }

    let len = reader.read_i32()?;
    if len < 5 {
        return Err(ProxyError::Protocol(format!("invalid document length {len}")));
    }
    let body = reader.take(len as usize - 4)?;
    let Some((&terminator, elements)) = body.split_last() else {
        return Err(ProxyError::Protocol("empty document body".into()));
    };
    if terminator != 0 {
        return Err(ProxyError::Protocol("document not NUL-terminated".into()));
    }

    let mut inner = WireReader::new(elements);
    let mut doc = Document::new();
    while !inner.is_empty() {
        let element_tag = inner.read_u8()?;
        let key = inner.read_cstring()?;
        let value = read_value(element_tag, &mut inner, depth)?;
        doc.entries.push((key, value));
    }
    Ok(doc)
}

fn read_value(element_tag: u8, r: &mut WireReader<'_>, depth: usize) -> Result<Value, ProxyError> {
    let value = match element_tag {
        tag::DOUBLE => Value::Double(r.read_f64()?),
        tag::STRING => Value::String(r.read_string()?),
        tag::DOCUMENT => Value::Document(read_document(r, depth + 1)?),
        tag::ARRAY => {
            let doc = read_document(r, depth + 1)?;
            Value::Array(Array::from_entries(doc.entries))
        }
        tag::BINARY => {
            let len = r.read_i32()?;
            if len < 0 {
                return Err(ProxyError::Protocol(format!("invalid binary length {len}")));
            }
            let subtype = r.read_u8()?;
            let bytes = Bytes::copy_from_slice(r.take(len as usize)?);
            Value::Binary { subtype, bytes }
        }
        tag::UNDEFINED => Value::Undefined,
        tag::OBJECT_ID => Value::ObjectId(r.read_array()?),
        tag::BOOLEAN => Value::Boolean(r.read_u8()?),
        tag::DATE_TIME => Value::DateTime(r.read_i64()?),
        tag::NULL => Value::Null,
        tag::REGEX => Value::Regex {
            pattern: r.read_cstring()?,
            options: r.read_cstring()?,
        },
        tag::DB_POINTER => Value::DbPointer {
            namespace: r.read_string()?,
            id: r.read_array()?,
        },
        tag::JAVASCRIPT => Value::JavaScript(r.read_string()?),
        tag::SYMBOL => Value::Symbol(r.read_string()?),
        tag::JAVASCRIPT_WITH_SCOPE => {
            let total = r.read_i32()?;
            if total < 4 {
                return Err(ProxyError::Protocol(format!(
                    "invalid code-with-scope length {total}"
                )));
            }
            let mut inner = WireReader::new(r.take(total as usize - 4)?);
            let code = inner.read_string()?;
            let scope = read_document(&mut inner, depth + 1)?;
            Value::JavaScriptWithScope { code, scope }
        }
        tag::INT32 => Value::Int32(r.read_i32()?),
        tag::TIMESTAMP => Value::Timestamp(r.read_u64()?),
        tag::INT64 => Value::Int64(r.read_i64()?),
        tag::DECIMAL128 => Value::Decimal128(r.read_array()?),
        tag::MIN_KEY => Value::MinKey,
        tag::MAX_KEY => Value::MaxKey,
        other => {
            return Err(ProxyError::Protocol(format!(
                "unknown element type 0x{other:02x}"
            )));
        }
    };
    Ok(value)
}

/// Encodes a document, appending it to `dst`.
pub(crate) fn write_document(doc: &Document, dst: &mut BytesMut) {
    let start = dst.len();
    dst.put_i32_le(0);
    for (key, value) in &doc.entries {
        write_element(key, value, dst);
    }
    dst.put_u8(0);
    patch_length(dst, start);
}

fn write_element(key: &str, value: &Value, dst: &mut BytesMut) {
    dst.put_u8(value.tag());
    put_cstring(key, dst);
    match value {
        Value::Double(v) => dst.put_f64_le(*v),
        Value::String(s) | Value::JavaScript(s) | Value::Symbol(s) => put_string(s, dst),
        Value::Document(d) => write_document(d, dst),
        Value::Array(array) => {
            let start = dst.len();
            dst.put_i32_le(0);
            for (i, item) in array.items().iter().enumerate() {
                write_element(&array.key(i), item, dst);
            }
            dst.put_u8(0);
            patch_length(dst, start);
        }
        Value::Binary { subtype, bytes } => {
            dst.put_i32_le(bytes.len() as i32);
            dst.put_u8(*subtype);
            dst.extend_from_slice(bytes);
        }
        Value::Undefined | Value::Null | Value::MinKey | Value::MaxKey => {}
        Value::ObjectId(id) => dst.extend_from_slice(id),
        Value::Boolean(b) => dst.put_u8(*b),
        Value::DateTime(v) => dst.put_i64_le(*v),
        Value::Regex { pattern, options } => {
            put_cstring(pattern, dst);
            put_cstring(options, dst);
        }
        Value::DbPointer { namespace, id } => {
            put_string(namespace, dst);
            dst.extend_from_slice(id);
        }
        Value::JavaScriptWithScope { code, scope } => {
            let start = dst.len();
            dst.put_i32_le(0);
            put_string(code, dst);
            write_document(scope, dst);
            patch_length(dst, start);
        }
        Value::Int32(v) => dst.put_i32_le(*v),
        Value::Timestamp(v) => dst.put_u64_le(*v),
        Value::Int64(v) => dst.put_i64_le(*v),
        Value::Decimal128(v) => dst.extend_from_slice(v),
    }
}

pub(crate) fn put_cstring(s: &str, dst: &mut BytesMut) {
    dst.extend_from_slice(s.as_bytes());
    dst.put_u8(0);
}

fn put_string(s: &str, dst: &mut BytesMut) {
    dst.put_i32_le(s.len() as i32 + 1);
    put_cstring(s, dst);
}

/// Back-fills the `i32` length prefix written at `start`.
fn patch_length(dst: &mut BytesMut, start: usize) {
    let len = (dst.len() - start) as i32;
    dst[start..start + 4].copy_from_slice(&len.to_le_bytes());
}
