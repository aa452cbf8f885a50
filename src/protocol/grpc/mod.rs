//! Native gRPC adapter.
//!
//! Supports all four call shapes. By default a fresh channel is built for
//! every invocation; [`GrpcProtocolBuilder::channel_cache`] reuses channels
//! per address, credential material and channel options instead.

mod channel;
mod metadata;

pub use channel::{ChannelFactory, ChannelOptions, GrpcChannel, TonicChannel, TonicChannelFactory};
pub use metadata::GrpcMetadataParser;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use moka::sync::Cache;
use prost_reflect::MethodDescriptor;
use serde_json::Value;
use tracing::{Instrument, Span, instrument};

use super::driver::{self, Outbound};
use super::tls::{ChannelCredentials, resolve_channel_credentials};
use super::{MetadataParser, Protocol, ProtocolOptions};
use crate::codec;
use crate::loader::{CallShape, PackageDefinition};
use crate::stream::{BidiStream, ClientStream, ServerStream};
use crate::telemetry;
use crate::types::{Capabilities, Metadata, RequestOptions, ResponseEnvelope, TlsConfig};
use crate::Result;

/// Transport name reported by [`GrpcProtocol`].
pub const PROTOCOL_NAME: &str = "gRPC";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChannelKey {
    address: String,
    credentials: ChannelCredentials,
    options: ChannelOptions,
}

/// Native gRPC [`Protocol`].
pub struct GrpcProtocol {
    options: ProtocolOptions,
    channel_options: ChannelOptions,
    factory: Arc<dyn ChannelFactory>,
    cache: Option<Cache<ChannelKey, Arc<dyn GrpcChannel>>>,
    parser: GrpcMetadataParser,
}

impl GrpcProtocol {
    /// Adapter with default channel options and the `tonic` channel factory.
    pub fn new(options: ProtocolOptions) -> Self {
        Self::builder(options.address).tls(options.tls).build()
    }

    pub fn builder(address: impl Into<String>) -> GrpcProtocolBuilder {
        GrpcProtocolBuilder::new(address)
    }

    pub fn options(&self) -> &ProtocolOptions {
        &self.options
    }

    /// Resolve credentials and obtain a channel for one invocation.
    fn channel(&self) -> Result<Arc<dyn GrpcChannel>> {
        let credentials = resolve_channel_credentials(&self.options.tls)?;
        let Some(cache) = &self.cache else {
            return self.factory.create_channel(
                &self.options.address,
                &credentials,
                &self.channel_options,
            );
        };
        let key = ChannelKey {
            address: self.options.address.clone(),
            credentials,
            options: self.channel_options.clone(),
        };
        if let Some(channel) = cache.get(&key) {
            return Ok(channel);
        }
        let channel =
            self.factory
                .create_channel(&key.address, &key.credentials, &key.options)?;
        cache.insert(key, Arc::clone(&channel));
        Ok(channel)
    }

    /// Everything that can fail before dispatch.
    fn prepare(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        metadata: Option<&Metadata>,
    ) -> Result<(MethodDescriptor, Arc<dyn GrpcChannel>, tonic::metadata::MetadataMap)> {
        let method = definition.resolve(options)?;
        let channel = self.channel()?;
        Ok((method, channel, self.parser.parse(metadata)))
    }
}

#[async_trait]
impl Protocol for GrpcProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
    }

    #[instrument(name = "grpc.unary", skip(self, definition, payload, metadata), fields(service = %options.service, method = %options.method))]
    async fn invoke_unary(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ResponseEnvelope> {
        let (method, channel, metadata) = self.prepare(definition, options, metadata)?;
        codec::to_message(&method.input(), &payload)?;

        let started = Instant::now();
        let result = channel.unary(method, payload, metadata).await;
        let timestamp = started.elapsed().as_millis() as u64;
        let envelope = match result {
            Ok(value) => ResponseEnvelope::ok(value, timestamp),
            Err(status) => ResponseEnvelope::from_status(&status, timestamp),
        };
        telemetry::record_call(PROTOCOL_NAME, CallShape::Unary, envelope.code(), started);
        Ok(envelope)
    }

    #[instrument(name = "grpc.client_stream", skip(self, definition, metadata), fields(service = %options.service, method = %options.method))]
    fn invoke_client_stream(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        metadata: Option<&Metadata>,
    ) -> Result<ClientStream> {
        let (method, channel, metadata) = self.prepare(definition, options, metadata)?;
        let (outbound, requests) = Outbound::new(method.input(), PROTOCOL_NAME);
        let (stream, driver) = ClientStream::open(PROTOCOL_NAME);
        tokio::spawn(
            async move {
                let call = channel.client_streaming(method, requests, metadata);
                driver::client_stream(call, outbound, driver).await;
            }
            .instrument(Span::current()),
        );
        Ok(stream)
    }

    #[instrument(name = "grpc.server_stream", skip(self, definition, payload, metadata), fields(service = %options.service, method = %options.method))]
    fn invoke_server_stream(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ServerStream> {
        let (method, channel, metadata) = self.prepare(definition, options, metadata)?;
        codec::to_message(&method.input(), &payload)?;
        let (stream, driver) = ServerStream::open(PROTOCOL_NAME);
        tokio::spawn(
            async move {
                let open = channel.server_streaming(method, payload, metadata);
                driver::server_stream(open, driver).await;
            }
            .instrument(Span::current()),
        );
        Ok(stream)
    }

    #[instrument(name = "grpc.bidi_stream", skip(self, definition, metadata), fields(service = %options.service, method = %options.method))]
    fn invoke_bidi_stream(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        metadata: Option<&Metadata>,
    ) -> Result<BidiStream> {
        let (method, channel, metadata) = self.prepare(definition, options, metadata)?;
        let (outbound, requests) = Outbound::new(method.input(), PROTOCOL_NAME);
        let (stream, driver) = BidiStream::open(PROTOCOL_NAME);
        tokio::spawn(
            async move {
                let open = channel.streaming(method, requests, metadata);
                driver::bidi_stream(open, outbound, driver).await;
            }
            .instrument(Span::current()),
        );
        Ok(stream)
    }
}

/// Builder for [`GrpcProtocol`].
pub struct GrpcProtocolBuilder {
    address: String,
    tls: TlsConfig,
    channel_options: ChannelOptions,
    factory: Option<Arc<dyn ChannelFactory>>,
    cache_capacity: Option<u64>,
}

impl GrpcProtocolBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: TlsConfig::default(),
            channel_options: ChannelOptions::default(),
            factory: None,
            cache_capacity: None,
        }
    }

    /// TLS configuration (default: insecure).
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn channel_options(mut self, options: ChannelOptions) -> Self {
        self.channel_options = options;
        self
    }

    /// Replace the channel factory (default: [`TonicChannelFactory`]).
    pub fn channel_factory(mut self, factory: Arc<dyn ChannelFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Reuse up to `capacity` channels across invocations.
    pub fn channel_cache(mut self, capacity: u64) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> GrpcProtocol {
        GrpcProtocol {
            options: ProtocolOptions {
                address: self.address,
                tls: self.tls,
            },
            channel_options: self.channel_options,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(TonicChannelFactory)),
            cache: self.cache_capacity.map(Cache::new),
            parser: GrpcMetadataParser,
        }
    }
}
