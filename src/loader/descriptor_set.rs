//! Loader for compiled `FileDescriptorSet`s.
//!
//! Produce one with `protoc --include_imports --descriptor_set_out=api.pb api.proto`
//! (or `buf build -o api.pb`).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{Loader, PackageDefinition, ServiceDefinition};
use crate::{BifrostError, Result};

/// Where the encoded descriptor set comes from.
#[derive(Debug, Clone)]
pub enum DescriptorSource {
    Path(PathBuf),
    Bytes(Bytes),
}

struct Loaded {
    definition: PackageDefinition,
    services: Vec<ServiceDefinition>,
}

/// Loads a [`PackageDefinition`] from an encoded `FileDescriptorSet`.
pub struct DescriptorSetLoader {
    source: DescriptorSource,
    loaded: OnceCell<Loaded>,
}

impl DescriptorSetLoader {
    pub fn new(source: DescriptorSource) -> Self {
        Self {
            source,
            loaded: OnceCell::new(),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(DescriptorSource::Path(path.into()))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(DescriptorSource::Bytes(bytes.into()))
    }

    async fn read_source(&self) -> Result<Bytes> {
        match &self.source {
            DescriptorSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| BifrostError::io(path, e)),
            DescriptorSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

#[async_trait]
impl Loader for DescriptorSetLoader {
    async fn load(&self) -> Result<()> {
        self.loaded
            .get_or_try_init(|| async {
                let bytes = self.read_source().await?;
                let definition = PackageDefinition::decode(&bytes)?;
                let services = definition.services();
                debug!(services = services.len(), "loaded package definition");
                Ok::<_, BifrostError>(Loaded {
                    definition,
                    services,
                })
            })
            .await?;
        Ok(())
    }

    fn package_definition(&self) -> Result<&PackageDefinition> {
        self.loaded
            .get()
            .map(|loaded| &loaded.definition)
            .ok_or(BifrostError::DefinitionNotLoaded)
    }

    fn services(&self) -> Option<&[ServiceDefinition]> {
        self.loaded.get().map(|loaded| loaded.services.as_slice())
    }
}
