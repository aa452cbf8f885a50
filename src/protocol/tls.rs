//! TLS credential resolution.
//!
//! Certificate and key files are read synchronously on every resolution.

use std::fs;
use std::path::Path;

use crate::types::TlsConfig;
use crate::{BifrostError, Result};

/// PEM material for an SSL channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SslCredentials {
    /// Trust anchor; `None` uses the system trust store.
    pub root_certificate: Option<Vec<u8>>,
    pub private_key: Option<Vec<u8>>,
    pub certificate_chain: Option<Vec<u8>>,
}

/// Credentials handed to the native channel factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ChannelCredentials {
    #[default]
    Insecure,
    Ssl(SslCredentials),
}

impl ChannelCredentials {
    pub fn create_insecure() -> Self {
        Self::Insecure
    }

    /// Arguments follow the root / private key / certificate chain order.
    pub fn create_ssl(
        root_certificate: Option<Vec<u8>>,
        private_key: Option<Vec<u8>>,
        certificate_chain: Option<Vec<u8>>,
    ) -> Self {
        Self::Ssl(SslCredentials {
            root_certificate,
            private_key,
            certificate_chain,
        })
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Ssl(_))
    }
}

/// PEM material for the gRPC-Web HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebTlsOptions {
    pub ca: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| BifrostError::io(path, e))
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(read).transpose()
}

pub fn resolve_channel_credentials(tls: &TlsConfig) -> Result<ChannelCredentials> {
    match tls {
        TlsConfig::Insecure => Ok(ChannelCredentials::create_insecure()),
        TlsConfig::ServerSide {
            root_certificate_path,
        } => Ok(ChannelCredentials::create_ssl(
            read_optional(root_certificate_path.as_deref())?,
            None,
            None,
        )),
        TlsConfig::Mutual {
            root_certificate_path,
            client_certificate_path,
            client_key_path,
        } => {
            let root = read_optional(root_certificate_path.as_deref())?;
            let cert = read(client_certificate_path)?;
            let key = read(client_key_path)?;
            Ok(ChannelCredentials::create_ssl(root, Some(key), Some(cert)))
        }
    }
}

pub fn resolve_web_tls(tls: &TlsConfig) -> Result<WebTlsOptions> {
    match tls {
        TlsConfig::Insecure => Ok(WebTlsOptions::default()),
        TlsConfig::ServerSide {
            root_certificate_path,
        } => Ok(WebTlsOptions {
            ca: read_optional(root_certificate_path.as_deref())?,
            ..Default::default()
        }),
        TlsConfig::Mutual {
            root_certificate_path,
            client_certificate_path,
            client_key_path,
        } => Ok(WebTlsOptions {
            ca: read_optional(root_certificate_path.as_deref())?,
            cert: Some(read(client_certificate_path)?),
            key: Some(read(client_key_path)?),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn insecure_reads_nothing() {
        let credentials = resolve_channel_credentials(&TlsConfig::Insecure).unwrap();
        assert_eq!(credentials, ChannelCredentials::Insecure);
        assert_eq!(resolve_web_tls(&TlsConfig::Insecure).unwrap(), WebTlsOptions::default());
    }

    #[test]
    fn server_side_without_root_uses_system_store() {
        let credentials = resolve_channel_credentials(&TlsConfig::server_side(None)).unwrap();
        assert_eq!(credentials, ChannelCredentials::create_ssl(None, None, None));
    }

    #[test]
    fn mutual_orders_root_key_cert() {
        let dir = tempfile::tempdir().unwrap();
        let root = write(&dir, "ca.pem", "root");
        let cert = write(&dir, "client.pem", "cert");
        let key = write(&dir, "client.key", "key");

        let credentials =
            resolve_channel_credentials(&TlsConfig::mutual(Some(root), &cert, &key)).unwrap();
        assert_eq!(
            credentials,
            ChannelCredentials::Ssl(SslCredentials {
                root_certificate: Some(b"root".to_vec()),
                private_key: Some(b"key".to_vec()),
                certificate_chain: Some(b"cert".to_vec()),
            })
        );

        let web = resolve_web_tls(&TlsConfig::mutual(None, &cert, &key)).unwrap();
        assert_eq!(web.ca, None);
        assert_eq!(web.cert.as_deref(), Some(b"cert".as_slice()));
        assert_eq!(web.key.as_deref(), Some(b"key".as_slice()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tls = TlsConfig::server_side(Some(PathBuf::from("/nonexistent/ca.pem")));
        assert!(matches!(
            resolve_channel_credentials(&tls),
            Err(BifrostError::Io { .. })
        ));
        assert!(matches!(resolve_web_tls(&tls), Err(BifrostError::Io { .. })));
    }
}
