use bytes::Bytes;

use crate::{common::ByteStr, ext::FmtExt, postgres::PgFormat};

/// A bound parameter value.
///
/// The variant decides the transfer format of the parameter.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// Text representation, encoded to the client encoding when sent.
    Text(ByteStr),
    /// Binary representation, sent as is.
    Binary(Bytes),
}

impl Value {
    /// Returns the transfer format of this value.
    pub fn format(&self) -> PgFormat {
        match self {
            Value::Text(_) => PgFormat::Text,
            Value::Binary(_) => PgFormat::Binary,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(ByteStr::copy_from_str(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value.into())
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Binary(value)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Text(text) => std::fmt::Debug::fmt(text, f),
            Value::Binary(bytes) => std::fmt::Debug::fmt(&bytes.lossy(), f),
        }
    }
}
