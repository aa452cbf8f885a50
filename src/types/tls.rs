//! Declarative TLS configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a transport should secure its connection.
///
/// Certificate paths are read when a call is made, not when the config is
/// built, so rotated files are picked up by the next invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TlsConfig {
    /// Plaintext connection.
    #[default]
    Insecure,
    /// Server-authenticated TLS. Without a root certificate the system trust
    /// store is used.
    ServerSide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_certificate_path: Option<PathBuf>,
    },
    /// Mutually-authenticated TLS.
    Mutual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_certificate_path: Option<PathBuf>,
        client_certificate_path: PathBuf,
        client_key_path: PathBuf,
    },
}

impl TlsConfig {
    pub fn server_side(root_certificate_path: Option<PathBuf>) -> Self {
        Self::ServerSide {
            root_certificate_path,
        }
    }

    pub fn mutual(
        root_certificate_path: Option<PathBuf>,
        client_certificate_path: impl Into<PathBuf>,
        client_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::Mutual {
            root_certificate_path,
            client_certificate_path: client_certificate_path.into(),
            client_key_path: client_key_path.into(),
        }
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, Self::Insecure)
    }
}
