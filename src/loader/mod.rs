//! Service definition loading.
//!
//! A [`Loader`] turns a schema source into a [`PackageDefinition`]: the
//! registry of services and methods the protocol adapters resolve requests
//! against. The definition is populated once and read-only afterwards.

mod descriptor_set;

pub use descriptor_set::{DescriptorSetLoader, DescriptorSource};

use async_trait::async_trait;
use prost_reflect::{DescriptorPool, MethodDescriptor, ServiceDescriptor};
use serde::Serialize;

use crate::types::RequestOptions;
use crate::{BifrostError, Result};

/// Request/response multiplicity of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidirectionalStreaming,
}

impl CallShape {
    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => Self::Unary,
            (true, false) => Self::ClientStreaming,
            (false, true) => Self::ServerStreaming,
            (true, true) => Self::BidirectionalStreaming,
        }
    }

    pub fn of(method: &MethodDescriptor) -> Self {
        Self::from_streaming(method.is_client_streaming(), method.is_server_streaming())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ClientStreaming => "client_streaming",
            Self::ServerStreaming => "server_streaming",
            Self::BidirectionalStreaming => "bidirectional_streaming",
        }
    }
}

/// Summary of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDefinition {
    pub name: String,
    pub call_shape: CallShape,
}

/// Summary of one service and its methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDefinition {
    /// Fully-qualified service name.
    pub name: String,
    pub methods: Vec<MethodDefinition>,
}

impl ServiceDefinition {
    fn from_descriptor(service: &ServiceDescriptor) -> Self {
        Self {
            name: service.full_name().to_string(),
            methods: service
                .methods()
                .map(|method| MethodDefinition {
                    name: method.name().to_string(),
                    call_shape: CallShape::of(&method),
                })
                .collect(),
        }
    }
}

/// Loaded registry of services, methods and their message types.
#[derive(Debug, Clone)]
pub struct PackageDefinition {
    pool: DescriptorPool,
}

impl PackageDefinition {
    pub fn new(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Decode a binary `FileDescriptorSet`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(DescriptorPool::decode(bytes)?))
    }

    pub fn from_file_descriptor_set(set: prost_types::FileDescriptorSet) -> Result<Self> {
        Ok(Self::new(DescriptorPool::from_file_descriptor_set(set)?))
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Resolve a request key to its method descriptor.
    ///
    /// An unknown service is reported before an unknown method.
    pub fn resolve(&self, options: &RequestOptions) -> Result<MethodDescriptor> {
        let service = self
            .pool
            .get_service_by_name(&options.service)
            .ok_or_else(|| BifrostError::ServiceNotFound(options.service.clone()))?;
        service
            .methods()
            .find(|method| method.name() == options.method)
            .ok_or_else(|| BifrostError::MethodNotFound(options.method.clone()))
    }

    pub fn services(&self) -> Vec<ServiceDefinition> {
        self.pool
            .services()
            .map(|service| ServiceDefinition::from_descriptor(&service))
            .collect()
    }
}

/// Source of a [`PackageDefinition`].
#[async_trait]
pub trait Loader: Send + Sync {
    /// Populate the definition. Calling again after success is a no-op.
    async fn load(&self) -> Result<()>;

    /// The loaded definition; `DefinitionNotLoaded` until `load` succeeds.
    fn package_definition(&self) -> Result<&PackageDefinition>;

    /// Service summaries; `None` until `load` succeeds.
    fn services(&self) -> Option<&[ServiceDefinition]>;
}
