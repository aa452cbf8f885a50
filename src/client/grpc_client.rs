//! [`GrpcClient`]: one call interface over any [`Protocol`].

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::loader::{CallShape, Loader, ServiceDefinition};
use crate::protocol::Protocol;
use crate::stream::{BidiStream, ClientStream, ServerStream};
use crate::types::{Capabilities, Metadata, RequestOptions, ResponseEnvelope};
use crate::{BifrostError, Result};

/// Pairs a [`Loader`] with a [`Protocol`] and dispatches calls.
///
/// Holds no per-call state. Every invocation resolves `service`/`method`
/// against the loaded definition and fails with `ServiceNotFound` or
/// `MethodNotFound` before anything is sent.
#[derive(Clone)]
pub struct GrpcClient {
    loader: Arc<dyn Loader>,
    protocol: Arc<dyn Protocol>,
}

impl GrpcClient {
    /// Build a client without loading the definition; call [`init`](Self::init) next.
    pub fn new(loader: Arc<dyn Loader>, protocol: Arc<dyn Protocol>) -> Self {
        Self { loader, protocol }
    }

    /// Build a client and load its definition.
    pub async fn create(loader: Arc<dyn Loader>, protocol: Arc<dyn Protocol>) -> Result<Self> {
        let client = Self::new(loader, protocol);
        client.init().await?;
        Ok(client)
    }

    /// Build a client from a [`ClientConfig`] and load its definition.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::create(config.loader(), config.protocol()).await
    }

    /// Load configuration from the standard locations, then [`from_config`](Self::from_config).
    pub async fn from_config_file(path: Option<&Path>) -> Result<Self> {
        Self::from_config(&ClientConfig::load(path)?).await
    }

    /// Load the service definition. Idempotent.
    pub async fn init(&self) -> Result<()> {
        self.loader.load().await?;
        debug!(protocol = self.protocol.name(), "client initialised");
        Ok(())
    }

    /// Services of the loaded definition; `None` before [`init`](Self::init).
    pub fn services(&self) -> Option<&[ServiceDefinition]> {
        self.loader.services()
    }

    /// Call shapes the active protocol can carry.
    pub fn capabilities(&self) -> Capabilities {
        self.protocol.capabilities()
    }

    pub fn protocol(&self) -> &dyn Protocol {
        self.protocol.as_ref()
    }

    // Capability errors take precedence over a missing definition.
    fn require(&self, shape: CallShape, operation: &'static str) -> Result<()> {
        if self.protocol.capabilities().supports(shape) {
            Ok(())
        } else {
            Err(BifrostError::Unsupported {
                protocol: self.protocol.name(),
                operation,
            })
        }
    }

    pub async fn invoke_unary(
        &self,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ResponseEnvelope> {
        let definition = self.loader.package_definition()?;
        self.protocol
            .invoke_unary(definition, options, payload, metadata)
            .await
    }

    pub fn invoke_client_stream(
        &self,
        options: &RequestOptions,
        metadata: Option<&Metadata>,
    ) -> Result<ClientStream> {
        self.require(CallShape::ClientStreaming, "client streaming")?;
        let definition = self.loader.package_definition()?;
        self.protocol
            .invoke_client_stream(definition, options, metadata)
    }

    pub fn invoke_server_stream(
        &self,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ServerStream> {
        let definition = self.loader.package_definition()?;
        self.protocol
            .invoke_server_stream(definition, options, payload, metadata)
    }

    pub fn invoke_bidi_stream(
        &self,
        options: &RequestOptions,
        metadata: Option<&Metadata>,
    ) -> Result<BidiStream> {
        self.require(CallShape::BidirectionalStreaming, "bidirectional streaming")?;
        let definition = self.loader.package_definition()?;
        self.protocol.invoke_bidi_stream(definition, options, metadata)
    }
}
