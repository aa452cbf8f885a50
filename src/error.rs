//! Bifrost error types
//!
//! Only failures that happen *before* a request leaves the process are
//! errors. A remote call that fails is a normal outcome and is reported as a
//! [`ResponseEnvelope`](crate::ResponseEnvelope) with a non-OK status code.

use std::path::PathBuf;

/// Bifrost error types
#[derive(Debug, thiserror::Error)]
pub enum BifrostError {
    // Lookup errors
    #[error("Service \"{0}\" not found in package definition")]
    ServiceNotFound(String),

    #[error("Method \"{0}\" not found in package definition")]
    MethodNotFound(String),

    // Capability errors
    /// The active transport has no wire mapping for this call shape.
    #[error("{protocol} doesn't support {operation} requests.")]
    Unsupported {
        protocol: &'static str,
        operation: &'static str,
    },

    // Definition errors
    #[error("Package definition is undefined, please load it first.")]
    DefinitionNotLoaded,

    #[error("descriptor error: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    // Local I/O errors
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Request construction errors
    #[error("invalid payload for {message}: {reason}")]
    InvalidPayload { message: String, reason: String },

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BifrostError {
    /// Caller asked for a service or method the loaded definition lacks.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::ServiceNotFound(_) | Self::MethodNotFound(_))
    }

    /// The transport cannot express the requested call shape.
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for Bifrost operations
pub type Result<T> = std::result::Result<T, BifrostError>;
