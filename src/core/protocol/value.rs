// src/core/protocol/value.rs

//! Defines the typed values carried inside documents, together with the
//! coercion helpers the proxy uses to read fields that may arrive in any of
//! several equivalent numeric encodings.

use super::document::Document;
use bytes::Bytes;
use std::borrow::Cow;

/// Element type tags as they appear on the wire.
pub(crate) mod tag {
    pub const DOUBLE: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const DOCUMENT: u8 = 0x03;
    pub const ARRAY: u8 = 0x04;
    pub const BINARY: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const OBJECT_ID: u8 = 0x07;
    pub const BOOLEAN: u8 = 0x08;
    pub const DATE_TIME: u8 = 0x09;
    pub const NULL: u8 = 0x0A;
    pub const REGEX: u8 = 0x0B;
    pub const DB_POINTER: u8 = 0x0C;
    pub const JAVASCRIPT: u8 = 0x0D;
    pub const SYMBOL: u8 = 0x0E;
    pub const JAVASCRIPT_WITH_SCOPE: u8 = 0x0F;
    pub const INT32: u8 = 0x10;
    pub const TIMESTAMP: u8 = 0x11;
    pub const INT64: u8 = 0x12;
    pub const DECIMAL128: u8 = 0x13;
    pub const MIN_KEY: u8 = 0xFF;
    pub const MAX_KEY: u8 = 0x7F;
}

/// The generic binary subtype used for SASL payloads.
pub const BINARY_SUBTYPE_GENERIC: u8 = 0x00;

/// A single document value. Every wire type is represented so that a decoded
/// message re-serializes to exactly the bytes it was read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Array),
    Binary { subtype: u8, bytes: Bytes },
    Undefined,
    ObjectId([u8; 12]),
    /// The byte as read off the wire. Any non-zero byte reads as `true`.
    Boolean(u8),
    DateTime(i64),
    Null,
    Regex { pattern: String, options: String },
    DbPointer { namespace: String, id: [u8; 12] },
    JavaScript(String),
    Symbol(String),
    JavaScriptWithScope { code: String, scope: Document },
    Int32(i32),
    Timestamp(u64),
    Int64(i64),
    Decimal128([u8; 16]),
    MinKey,
    MaxKey,
}

impl Value {
    /// Returns the wire tag for this value.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Value::Double(_) => tag::DOUBLE,
            Value::String(_) => tag::STRING,
            Value::Document(_) => tag::DOCUMENT,
            Value::Array(_) => tag::ARRAY,
            Value::Binary { .. } => tag::BINARY,
            Value::Undefined => tag::UNDEFINED,
            Value::ObjectId(_) => tag::OBJECT_ID,
            Value::Boolean(_) => tag::BOOLEAN,
            Value::DateTime(_) => tag::DATE_TIME,
            Value::Null => tag::NULL,
            Value::Regex { .. } => tag::REGEX,
            Value::DbPointer { .. } => tag::DB_POINTER,
            Value::JavaScript(_) => tag::JAVASCRIPT,
            Value::Symbol(_) => tag::SYMBOL,
            Value::JavaScriptWithScope { .. } => tag::JAVASCRIPT_WITH_SCOPE,
            Value::Int32(_) => tag::INT32,
            Value::Timestamp(_) => tag::TIMESTAMP,
            Value::Int64(_) => tag::INT64,
            Value::Decimal128(_) => tag::DECIMAL128,
            Value::MinKey => tag::MIN_KEY,
            Value::MaxKey => tag::MAX_KEY,
        }
    }

    /// Creates a generic-subtype binary value.
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Value::Binary {
            subtype: BINARY_SUBTYPE_GENERIC,
            bytes: bytes.into(),
        }
    }

    // --- Coercion helpers ---
    //
    // Servers and drivers are free to encode the same logical number as int32,
    // int64 or double. These helpers are the single place where that variance is
    // absorbed; no other module matches on numeric variants.

    /// Reads any numeric form as a double.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Reads any numeric form as a 64-bit integer. Doubles are accepted only
    /// when they hold an integral value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Reads any numeric form as a 32-bit integer. Values outside the `i32`
    /// range read as absent.
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    /// Reads a boolean, accepting non-zero integers as `true`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b != 0),
            Value::Int32(v) => Some(*v != 0),
            Value::Int64(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Reads the raw bytes of a binary value.
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.items()),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(u8::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Array::from(v))
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

/// The elements of an array value.
///
/// On the wire an array is a document keyed `"0"`, `"1"`, ... . Keys that
/// deviate from that sequence are kept so the array encodes back unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    items: Vec<Value>,
    keys: Option<Vec<String>>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the elements are keyed by their index, as encoders normally
    /// write them.
    pub fn has_index_keys(&self) -> bool {
        self.keys.is_none()
    }

    /// The key the element at `index` is encoded under.
    pub fn key(&self, index: usize) -> Cow<'_, str> {
        match self.keys.as_ref().and_then(|keys| keys.get(index)) {
            Some(key) => Cow::Borrowed(key),
            None => Cow::Owned(index.to_string()),
        }
    }

    /// Builds an array from `(key, value)` elements as they appear on the wire.
    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        let indexed = entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| *key == i.to_string());
        let (keys, items): (Vec<String>, Vec<Value>) = entries.into_iter().unzip();
        Self {
            items,
            keys: (!indexed).then_some(keys),
        }
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self { items, keys: None }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
