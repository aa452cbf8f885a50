//! Caller-supplied call metadata

use std::collections::HashMap;

use bytes::Bytes;

/// Plain key → value metadata handed to an invocation.
pub type Metadata = HashMap<String, MetadataValue>;

/// A single metadata value. Binary values belong under `-bin` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Binary(Bytes),
}

impl MetadataValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for MetadataValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

/// Whether a key names binary metadata by gRPC convention.
pub(crate) fn is_binary_key(key: &str) -> bool {
    key.ends_with("-bin")
}
