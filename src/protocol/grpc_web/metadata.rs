use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::protocol::MetadataParser;
use crate::types::{Metadata, MetadataValue, is_binary_key};

/// Folds caller metadata into HTTP request headers.
///
/// Values under `-bin` keys are sent base64-encoded, as gRPC-Web expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcWebMetadataParser;

impl GrpcWebMetadataParser {
    fn header_value(key: &str, value: &MetadataValue) -> Option<HeaderValue> {
        if is_binary_key(key) {
            return HeaderValue::from_str(&STANDARD.encode(value.as_bytes())).ok();
        }
        match value {
            MetadataValue::Text(text) => HeaderValue::from_str(text).ok(),
            MetadataValue::Binary(_) => None,
        }
    }
}

impl MetadataParser for GrpcWebMetadataParser {
    type Output = HeaderMap;

    fn parse(&self, metadata: Option<&Metadata>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (key, value) in metadata.into_iter().flatten() {
            let Ok(name) = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) else {
                warn!(key = %key, "dropping metadata entry with invalid key");
                continue;
            };
            match Self::header_value(name.as_str(), value) {
                Some(value) => {
                    headers.insert(name, value);
                }
                None => warn!(key = %key, "dropping metadata entry with invalid value"),
            }
        }
        headers
    }
}
