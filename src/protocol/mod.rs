//! Protocol adapters.
//!
//! A [`Protocol`] implements the four call shapes against one transport:
//! [`grpc`] drives native gRPC over `tonic`, [`grpc_web`] drives gRPC-Web
//! over HTTP. The client facade holds one as `Arc<dyn Protocol>`.
//!
//! Failures that happen before a request leaves the process (lookup,
//! capability, credential files, malformed payload) are returned as
//! [`BifrostError`]. Anything the transport reports comes back as a
//! [`ResponseEnvelope`] or stream event with a non-OK status.

mod driver;
pub mod grpc;
pub mod grpc_web;
mod tls;

pub use driver::{RequestStream, ResponseStream};
pub use tls::{
    ChannelCredentials, SslCredentials, WebTlsOptions, resolve_channel_credentials,
    resolve_web_tls,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::loader::PackageDefinition;
use crate::stream::{BidiStream, ClientStream, ServerStream};
use crate::types::{Capabilities, Metadata, RequestOptions, ResponseEnvelope, TlsConfig};
use crate::{BifrostError, Result};

/// Connection settings shared by every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolOptions {
    /// `host:port`, or a full `http(s)://` URL.
    pub address: String,
    pub tls: TlsConfig,
}

impl ProtocolOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: TlsConfig::default(),
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}

/// Converts caller metadata into a transport-native container.
///
/// Total: absent input yields an empty container.
pub trait MetadataParser {
    type Output;

    fn parse(&self, metadata: Option<&Metadata>) -> Self::Output;
}

/// One transport's implementation of the four call shapes.
///
/// Streaming invocations spawn a driver task and must be called from within
/// a tokio runtime.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Transport name used in logs, metrics and capability errors.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Single request, single response. Remote failures resolve to an
    /// error-coded envelope.
    async fn invoke_unary(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ResponseEnvelope>;

    fn invoke_client_stream(
        &self,
        _definition: &PackageDefinition,
        _options: &RequestOptions,
        _metadata: Option<&Metadata>,
    ) -> Result<ClientStream> {
        Err(BifrostError::Unsupported {
            protocol: self.name(),
            operation: "client streaming",
        })
    }

    fn invoke_server_stream(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ServerStream>;

    fn invoke_bidi_stream(
        &self,
        _definition: &PackageDefinition,
        _options: &RequestOptions,
        _metadata: Option<&Metadata>,
    ) -> Result<BidiStream> {
        Err(BifrostError::Unsupported {
            protocol: self.name(),
            operation: "bidirectional streaming",
        })
    }
}
