//! gRPC-Web adapter.
//!
//! gRPC-Web maps a call onto one HTTP request/response, so only unary and
//! server-streaming calls exist. Client and bidirectional streaming fail
//! with [`BifrostError::Unsupported`] before any lookup happens.
//!
//! [`BifrostError::Unsupported`]: crate::BifrostError::Unsupported

mod metadata;
mod transport;

pub use metadata::GrpcWebMetadataParser;
pub use transport::{
    DEFAULT_EVENT_BUFFER, GRPC_MESSAGE, GRPC_STATUS, HttpWebTransport, WebEvent, WebEventStream,
    WebRequest, WebTransport, encode_frame, encode_message, encode_trailers,
};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::HeaderMap;
use prost_reflect::{MessageDescriptor, MethodDescriptor};
use serde_json::Value;
use tonic::Status;
use tonic::metadata::MetadataMap;
use tracing::{Instrument, Span, instrument};

use super::driver::{self, ResponseStream};
use super::tls::resolve_web_tls;
use super::{MetadataParser, Protocol, ProtocolOptions};
use crate::codec;
use crate::loader::{CallShape, PackageDefinition};
use crate::stream::ServerStream;
use crate::telemetry;
use crate::types::{Capabilities, Metadata, RequestOptions, ResponseEnvelope, StatusCode, TlsConfig};
use crate::Result;

/// Transport name reported by [`GrpcWebProtocol`].
pub const PROTOCOL_NAME: &str = "gRPC-Web";

/// Non-OK status carried by a final header map. A missing `grpc-status`
/// means OK; an unparsable one is `Unknown`.
pub fn trailer_status(trailers: &HeaderMap) -> Option<Status> {
    let code = match trailers.get(GRPC_STATUS) {
        None => StatusCode::Ok,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(StatusCode::parse)
            .unwrap_or(StatusCode::Unknown),
    };
    if code.is_ok() {
        return None;
    }
    let message = trailers
        .get(GRPC_MESSAGE)
        .map(|value| percent_decode(value.as_bytes()))
        .unwrap_or_default();
    let mut metadata = trailers.clone();
    metadata.remove(GRPC_STATUS);
    metadata.remove(GRPC_MESSAGE);
    Some(Status::with_metadata(
        tonic::Code::from_i32(code.as_i32()),
        message,
        MetadataMap::from_headers(metadata),
    ))
}

/// `grpc-message` values are percent-encoded.
fn percent_decode(raw: &[u8]) -> String {
    let mut decoded = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Turn transport events into decoded responses ending with the call status.
fn responses(events: WebEventStream, output: MessageDescriptor) -> ResponseStream {
    Box::pin(events.filter_map(move |event| {
        let output = output.clone();
        async move {
            match event {
                WebEvent::Message(bytes) => Some(codec::decode_json(&output, &bytes)),
                WebEvent::End(trailers) => trailer_status(&trailers).map(Err),
            }
        }
    }))
}

/// gRPC-Web [`Protocol`].
pub struct GrpcWebProtocol {
    options: ProtocolOptions,
    transport: Arc<dyn WebTransport>,
    parser: GrpcWebMetadataParser,
}

impl GrpcWebProtocol {
    /// Adapter over [`HttpWebTransport`].
    pub fn new(options: ProtocolOptions) -> Self {
        Self::builder(options.address).tls(options.tls).build()
    }

    pub fn builder(address: impl Into<String>) -> GrpcWebProtocolBuilder {
        GrpcWebProtocolBuilder::new(address)
    }

    pub fn options(&self) -> &ProtocolOptions {
        &self.options
    }

    /// Base URL: the address as given when it carries a scheme, otherwise
    /// `http://` for insecure connections and `https://` for TLS.
    pub fn url(&self) -> String {
        let address = &self.options.address;
        if address.starts_with("http://") || address.starts_with("https://") {
            address.clone()
        } else if self.options.tls.is_insecure() {
            format!("http://{address}")
        } else {
            format!("https://{address}")
        }
    }

    fn prepare(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: &Value,
        metadata: Option<&Metadata>,
    ) -> Result<(MethodDescriptor, WebRequest)> {
        let method = definition.resolve(options)?;
        let body: Bytes = codec::encode_json(&method.input(), payload)?;
        let request = WebRequest {
            host: self.url(),
            path: codec::method_path(&method),
            body,
            metadata: self.parser.parse(metadata),
            tls: resolve_web_tls(&self.options.tls)?,
        };
        Ok((method, request))
    }
}

#[async_trait]
impl Protocol for GrpcWebProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::server_push_only()
    }

    #[instrument(name = "grpc_web.unary", skip(self, definition, payload, metadata), fields(service = %options.service, method = %options.method))]
    async fn invoke_unary(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ResponseEnvelope> {
        let (method, request) = self.prepare(definition, options, &payload, metadata)?;

        let started = Instant::now();
        let mut responses = responses(self.transport.invoke(request), method.output());
        let mut first = None;
        let mut failure = None;
        while let Some(item) = responses.next().await {
            match item {
                Ok(value) => {
                    first.get_or_insert(value);
                }
                Err(status) => {
                    failure = Some(status);
                    break;
                }
            }
        }
        let timestamp = started.elapsed().as_millis() as u64;
        let envelope = match (failure, first) {
            (Some(status), _) => ResponseEnvelope::from_status(&status, timestamp),
            (None, Some(value)) => ResponseEnvelope::ok(value, timestamp),
            (None, None) => ResponseEnvelope::from_status(
                &Status::unknown("response closed without a message"),
                timestamp,
            ),
        };
        telemetry::record_call(PROTOCOL_NAME, CallShape::Unary, envelope.code(), started);
        Ok(envelope)
    }

    #[instrument(name = "grpc_web.server_stream", skip(self, definition, payload, metadata), fields(service = %options.service, method = %options.method))]
    fn invoke_server_stream(
        &self,
        definition: &PackageDefinition,
        options: &RequestOptions,
        payload: Value,
        metadata: Option<&Metadata>,
    ) -> Result<ServerStream> {
        let (method, request) = self.prepare(definition, options, &payload, metadata)?;
        let (stream, driver) = ServerStream::open(PROTOCOL_NAME);
        let responses = responses(self.transport.invoke(request), method.output());
        tokio::spawn(
            driver::server_stream(async move { Ok::<_, Status>(responses) }, driver)
                .instrument(Span::current()),
        );
        Ok(stream)
    }
}

/// Builder for [`GrpcWebProtocol`].
pub struct GrpcWebProtocolBuilder {
    address: String,
    tls: TlsConfig,
    transport: Option<Arc<dyn WebTransport>>,
}

impl GrpcWebProtocolBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: TlsConfig::default(),
            transport: None,
        }
    }

    /// TLS configuration (default: insecure).
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Replace the wire transport (default: [`HttpWebTransport`]).
    pub fn transport(mut self, transport: Arc<dyn WebTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> GrpcWebProtocol {
        GrpcWebProtocol {
            options: ProtocolOptions {
                address: self.address,
                tls: self.tls,
            },
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpWebTransport::new())),
            parser: GrpcWebMetadataParser,
        }
    }
}
