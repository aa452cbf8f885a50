//! Client configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (if provided)
//! 2. `~/.bifrost/config.toml` (user)
//! 3. `/etc/bifrost/config.toml` (system)
//!
//! ```toml
//! address = "localhost:50051"
//! protocol = "grpc"            # or "grpc-web"
//! descriptor_set = "api.pb"    # relative to the config file
//! channel_cache = 16           # optional, native gRPC only
//!
//! [tls]
//! type = "server-side"
//! root_certificate_path = "/certs/ca.pem"
//!
//! [channel]
//! ssl_target_name_override = "api.internal"
//! connect_timeout = 5
//! timeout = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::loader::{DescriptorSetLoader, Loader};
use crate::protocol::Protocol;
use crate::protocol::grpc::{ChannelOptions, GrpcProtocol};
use crate::protocol::grpc_web::GrpcWebProtocol;
use crate::types::TlsConfig;
use crate::{BifrostError, Result};

/// Which transport the client speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    #[default]
    Grpc,
    GrpcWeb,
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// `host:port` or a full `http(s)://` URL.
    pub address: String,
    #[serde(default)]
    pub protocol: ProtocolKind,
    /// Encoded `FileDescriptorSet` describing the services.
    pub descriptor_set: PathBuf,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Native gRPC channel overrides; ignored by gRPC-Web.
    #[serde(default)]
    pub channel: ChannelOptions,
    /// Reuse up to this many native gRPC channels.
    #[serde(default)]
    pub channel_cache: Option<u64>,
}

impl ClientConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.bifrost/config.toml`
    /// 3. `/etc/bifrost/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let mut config = Self::from_toml(&content).map_err(|e| {
            BifrostError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        if config.descriptor_set.is_relative() {
            if let Some(dir) = path.parent() {
                config.descriptor_set = dir.join(&config.descriptor_set);
            }
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(BifrostError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bifrost").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/bifrost/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(BifrostError::Configuration(
            "No config file found. Create ~/.bifrost/config.toml or /etc/bifrost/config.toml"
                .to_string(),
        ))
    }

    /// Protocol adapter described by this configuration.
    pub fn protocol(&self) -> Arc<dyn Protocol> {
        match self.protocol {
            ProtocolKind::Grpc => {
                let mut builder = GrpcProtocol::builder(self.address.clone())
                    .tls(self.tls.clone())
                    .channel_options(self.channel.clone());
                if let Some(capacity) = self.channel_cache {
                    builder = builder.channel_cache(capacity);
                }
                Arc::new(builder.build())
            }
            ProtocolKind::GrpcWeb => Arc::new(
                GrpcWebProtocol::builder(self.address.clone())
                    .tls(self.tls.clone())
                    .build(),
            ),
        }
    }

    /// Loader for the configured descriptor set.
    pub fn loader(&self) -> Arc<dyn Loader> {
        Arc::new(DescriptorSetLoader::from_path(&self.descriptor_set))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            address = "localhost:50051"
            descriptor_set = "/srv/api.pb"
        "#,
        )
        .unwrap();
        assert_eq!(config.protocol, ProtocolKind::Grpc);
        assert!(config.tls.is_insecure());
        assert_eq!(config.channel, ChannelOptions::default());
        assert_eq!(config.channel_cache, None);
    }

    #[test]
    fn full_config() {
        let config = ClientConfig::from_toml(
            r#"
            address = "https://api.example.com"
            protocol = "grpc-web"
            descriptor_set = "api.pb"

            [tls]
            type = "mutual"
            client_certificate_path = "/certs/client.pem"
            client_key_path = "/certs/client.key"

            [channel]
            timeout = 10
        "#,
        )
        .unwrap();
        assert_eq!(config.protocol, ProtocolKind::GrpcWeb);
        assert_eq!(
            config.tls,
            TlsConfig::mutual(None, "/certs/client.pem", "/certs/client.key")
        );
        assert_eq!(config.channel.timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.protocol().name(), "gRPC-Web");
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let result = ClientConfig::from_toml(
            r#"
            address = "localhost:50051"
            protocol = "thrift"
            descriptor_set = "api.pb"
        "#,
        );
        assert!(matches!(result, Err(BifrostError::Toml(_))));
    }

    #[test]
    fn relative_descriptor_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "address = \"localhost:50051\"\ndescriptor_set = \"api.pb\"\n",
        )
        .unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.descriptor_set, dir.path().join("api.pb"));
    }

    #[test]
    fn missing_explicit_path_is_configuration_error() {
        let err = ClientConfig::load(Some(Path::new("/nonexistent/bifrost.toml"))).unwrap_err();
        assert!(matches!(err, BifrostError::Configuration(_)));
    }
}
