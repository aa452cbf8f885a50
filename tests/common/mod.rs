//! Shared fixtures and mock transports for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use prost::Message;
use prost_reflect::MethodDescriptor;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use serde_json::{Value, json};
use tonic::Status;
use tonic::metadata::MetadataMap;

use bifrost::protocol::grpc::{ChannelFactory, ChannelOptions, GrpcChannel};
use bifrost::protocol::grpc_web::{WebEvent, WebEventStream, WebRequest, WebTransport};
use bifrost::protocol::{RequestStream, ResponseStream};
use bifrost::{
    ChannelCredentials, DescriptorSetLoader, GrpcClient, GrpcProtocol, GrpcWebProtocol, Loader,
    PackageDefinition, Protocol, RequestOptions, Result,
};

pub const SERVICE: &str = "simple_package.v1.SimpleService";
pub const UNARY: &str = "SimpleUnaryRequest";
pub const CLIENT_STREAM: &str = "SimpleClientStreamRequest";
pub const SERVER_STREAM: &str = "SimpleServerStreamRequest";
pub const BIDI_STREAM: &str = "SimpleBidirectionalStreamRequest";

// ============================================================================
// Descriptor fixtures
// ============================================================================

fn method(name: &str, client_streaming: bool, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(".simple_package.v1.SimpleMessage".to_string()),
        output_type: Some(".simple_package.v1.SimpleMessage".to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// `simple_package.v1.SimpleService` with one method per call shape, all
/// taking and returning `SimpleMessage { string id = 1; }`.
pub fn simple_service() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("simple.proto".to_string()),
            package: Some("simple_package.v1".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("SimpleMessage".to_string()),
                field: vec![FieldDescriptorProto {
                    name: Some("id".to_string()),
                    number: Some(1),
                    label: Some(Label::Optional as i32),
                    r#type: Some(Type::String as i32),
                    json_name: Some("id".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            service: vec![ServiceDescriptorProto {
                name: Some("SimpleService".to_string()),
                method: vec![
                    method(UNARY, false, false),
                    method(CLIENT_STREAM, true, false),
                    method(SERVER_STREAM, false, true),
                    method(BIDI_STREAM, true, true),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn encoded_descriptor_set() -> Vec<u8> {
    simple_service().encode_to_vec()
}

pub fn definition() -> PackageDefinition {
    PackageDefinition::from_file_descriptor_set(simple_service()).unwrap()
}

pub fn loader() -> Arc<dyn Loader> {
    Arc::new(DescriptorSetLoader::from_bytes(encoded_descriptor_set()))
}

pub fn options(method: &str) -> RequestOptions {
    RequestOptions::new(SERVICE, method)
}

/// Protobuf encoding of `SimpleMessage { id }`.
pub fn encode_simple(id: &str) -> Bytes {
    let method = definition().resolve(&options(UNARY)).unwrap();
    bifrost::codec::encode_json(&method.input(), &json!({ "id": id })).unwrap()
}

pub async fn client(protocol: Arc<dyn Protocol>) -> GrpcClient {
    GrpcClient::create(loader(), protocol).await.unwrap()
}

// ============================================================================
// Native gRPC mocks
// ============================================================================

/// Scripted [`GrpcChannel`].
///
/// - unary echoes the payload, or fails with `unary_error`
/// - client streaming answers with the request ids joined by `,`
/// - server streaming yields `server_items`, counting each one pulled in
///   `server_pulled`, then stays open when `server_hangs` is set
/// - bidirectional streaming echoes every request
#[derive(Default)]
pub struct MockChannel {
    pub unary_error: Option<Status>,
    pub server_items: Vec<std::result::Result<Value, Status>>,
    pub server_hangs: bool,
    pub server_pulled: Arc<AtomicUsize>,
    pub seen_metadata: Mutex<Vec<MetadataMap>>,
}

impl MockChannel {
    fn record(&self, metadata: MetadataMap) {
        self.seen_metadata.lock().unwrap().push(metadata);
    }

    pub fn last_metadata(&self) -> MetadataMap {
        self.seen_metadata.lock().unwrap().last().cloned().unwrap()
    }
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap_or_default().to_string()
}

#[async_trait]
impl GrpcChannel for MockChannel {
    async fn unary(
        &self,
        _method: MethodDescriptor,
        payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status> {
        self.record(metadata);
        match &self.unary_error {
            Some(status) => Err(status.clone()),
            None => Ok(payload),
        }
    }

    async fn client_streaming(
        &self,
        _method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status> {
        self.record(metadata);
        let ids: Vec<String> = requests.map(|value| id_of(&value)).collect().await;
        Ok(json!({ "id": ids.join(",") }))
    }

    async fn server_streaming(
        &self,
        _method: MethodDescriptor,
        _payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status> {
        self.record(metadata);
        let pulled = Arc::clone(&self.server_pulled);
        let items = stream::iter(self.server_items.clone()).inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        });
        if self.server_hangs {
            Ok(Box::pin(items.chain(stream::pending())))
        } else {
            Ok(Box::pin(items))
        }
    }

    async fn streaming(
        &self,
        _method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status> {
        self.record(metadata);
        Ok(Box::pin(requests.map(|value| Ok(json!({ "id": id_of(&value) })))))
    }
}

/// Hands out the same [`MockChannel`] for every invocation.
pub struct MockFactory(pub Arc<MockChannel>);

impl ChannelFactory for MockFactory {
    fn create_channel(
        &self,
        _address: &str,
        _credentials: &ChannelCredentials,
        _options: &ChannelOptions,
    ) -> Result<Arc<dyn GrpcChannel>> {
        Ok(self.0.clone())
    }
}

pub fn grpc_protocol(channel: Arc<MockChannel>) -> Arc<dyn Protocol> {
    Arc::new(
        GrpcProtocol::builder("localhost:50051")
            .channel_factory(Arc::new(MockFactory(channel)))
            .build(),
    )
}

// ============================================================================
// gRPC-Web mocks
// ============================================================================

/// Replays a fixed event sequence and records every request.
#[derive(Default)]
pub struct MockWebTransport {
    pub events: Vec<WebEvent>,
    pub requests: Mutex<Vec<WebRequest>>,
}

impl WebTransport for MockWebTransport {
    fn invoke(&self, request: WebRequest) -> WebEventStream {
        self.requests.lock().unwrap().push(request);
        Box::pin(stream::iter(self.events.clone()))
    }
}

pub fn web_protocol(transport: Arc<MockWebTransport>) -> Arc<dyn Protocol> {
    Arc::new(
        GrpcWebProtocol::builder("10.10.10.10")
            .transport(transport)
            .build(),
    )
}
