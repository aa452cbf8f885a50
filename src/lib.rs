//! Bifrost - one call interface over native gRPC and gRPC-Web
//!
//! This crate provides a [`GrpcClient`] that drives unary, client-streaming,
//! server-streaming and bidirectional calls through a [`Protocol`] adapter,
//! so callers see the same response envelopes and stream events whichever
//! transport is in use. Services are described by an encoded
//! `FileDescriptorSet`; payloads are JSON values.
//!
//! # Unary Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bifrost::{DescriptorSetLoader, GrpcClient, GrpcProtocol, RequestOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let client = GrpcClient::create(
//!         Arc::new(DescriptorSetLoader::from_path("api.pb")),
//!         Arc::new(GrpcProtocol::builder("localhost:50051").build()),
//!     )
//!     .await?;
//!
//!     let response = client
//!         .invoke_unary(
//!             &RequestOptions::new("simple_package.v1.SimpleService", "SimpleUnaryRequest"),
//!             json!({ "id": "abc" }),
//!             None,
//!         )
//!         .await?;
//!
//!     println!("{} after {}ms", response.code(), response.timestamp());
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bifrost::{BidiStreamEvent, DescriptorSetLoader, GrpcClient, GrpcProtocol, RequestOptions};
//! use futures_util::StreamExt;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let client = GrpcClient::create(
//!         Arc::new(DescriptorSetLoader::from_path("api.pb")),
//!         Arc::new(GrpcProtocol::builder("localhost:50051").build()),
//!     )
//!     .await?;
//!
//!     let mut call = client.invoke_bidi_stream(
//!         &RequestOptions::new(
//!             "simple_package.v1.SimpleService",
//!             "SimpleBidirectionalStreamRequest",
//!         ),
//!         None,
//!     )?;
//!     call.write(json!({ "id": "1" }));
//!     call.end_client_stream();
//!
//!     while let Some(event) = call.next().await {
//!         match event {
//!             BidiStreamEvent::Response(envelope) => println!("{:?}", envelope.value()),
//!             BidiStreamEvent::Error(envelope) => eprintln!("failed: {}", envelope.code()),
//!             BidiStreamEvent::EndServerStream => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod stream;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use client::GrpcClient;
pub use config::{ClientConfig, ProtocolKind};
pub use error::{BifrostError, Result};
pub use loader::{
    CallShape, DescriptorSetLoader, DescriptorSource, Loader, MethodDefinition, PackageDefinition,
    ServiceDefinition,
};
pub use protocol::grpc::{ChannelOptions, GrpcProtocol, GrpcProtocolBuilder};
pub use protocol::grpc_web::{GrpcWebProtocol, GrpcWebProtocolBuilder, HttpWebTransport};
pub use protocol::{ChannelCredentials, MetadataParser, Protocol, ProtocolOptions};
pub use stream::{
    BidiStream, BidiStreamEvent, ClientStream, ClientStreamEvent, ServerStream, ServerStreamEvent,
};

// Re-export all types
pub use types::{
    Capabilities, ErrorMetadata, ErrorValue, Metadata, MetadataValue, RequestOptions,
    ResponseData, ResponseEnvelope, StatusCode, TlsConfig,
};
