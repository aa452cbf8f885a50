use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, MetadataMap};
use tracing::warn;

use crate::protocol::MetadataParser;
use crate::types::{Metadata, MetadataValue, is_binary_key};

/// Folds caller metadata into a `tonic` [`MetadataMap`].
///
/// Keys are lowercased. `-bin` keys carry raw bytes; every other value must
/// be visible ASCII. Entries that cannot be represented are skipped with a
/// warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcMetadataParser;

impl MetadataParser for GrpcMetadataParser {
    type Output = MetadataMap;

    fn parse(&self, metadata: Option<&Metadata>) -> MetadataMap {
        let mut map = MetadataMap::new();
        for (key, value) in metadata.into_iter().flatten() {
            let key = key.to_ascii_lowercase();
            if is_binary_key(&key) {
                match BinaryMetadataKey::from_bytes(key.as_bytes()) {
                    Ok(name) => {
                        map.insert_bin(name, BinaryMetadataValue::from_bytes(value.as_bytes()));
                    }
                    Err(e) => warn!(key = %key, error = %e, "dropping metadata entry"),
                }
                continue;
            }
            let text = match value {
                MetadataValue::Text(text) => text.as_bytes(),
                MetadataValue::Binary(_) => {
                    warn!(key = %key, "binary metadata value requires a -bin key");
                    continue;
                }
            };
            match (
                AsciiMetadataKey::from_bytes(key.as_bytes()),
                AsciiMetadataValue::try_from(text),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => warn!(key = %key, "dropping metadata entry with invalid key or value"),
            }
        }
        map
    }
}
