//! Native gRPC channel primitives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prost_reflect::MethodDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tonic::client::Grpc;
use tonic::metadata::MetadataMap;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::{Request, Status};
use tracing::debug;

use crate::codec::{self, JsonCodec};
use crate::protocol::driver::{RequestStream, ResponseStream};
use crate::protocol::tls::ChannelCredentials;
use crate::{BifrostError, Result};

/// Optional channel overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Name checked against the server certificate instead of the address host.
    #[serde(default)]
    pub ssl_target_name_override: Option<String>,
    #[serde(default, with = "optional_secs")]
    pub connect_timeout: Option<Duration>,
    /// Per-request deadline.
    #[serde(default, with = "optional_secs")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Durations as whole seconds in config files.
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// One connection to a gRPC server, carrying JSON payloads.
#[async_trait]
pub trait GrpcChannel: Send + Sync {
    async fn unary(
        &self,
        method: MethodDescriptor,
        payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status>;

    async fn client_streaming(
        &self,
        method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status>;

    async fn server_streaming(
        &self,
        method: MethodDescriptor,
        payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status>;

    async fn streaming(
        &self,
        method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status>;
}

/// Builds channels bound to an address.
pub trait ChannelFactory: Send + Sync {
    fn create_channel(
        &self,
        address: &str,
        credentials: &ChannelCredentials,
        options: &ChannelOptions,
    ) -> Result<Arc<dyn GrpcChannel>>;
}

/// [`ChannelFactory`] producing lazily connected `tonic` channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TonicChannelFactory;

impl TonicChannelFactory {
    /// Prefix a scheme when the address has none.
    fn endpoint_uri(address: &str, secure: bool) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else if secure {
            format!("https://{address}")
        } else {
            format!("http://{address}")
        }
    }

    fn tls_config(credentials: &ChannelCredentials, options: &ChannelOptions) -> Option<ClientTlsConfig> {
        let ChannelCredentials::Ssl(ssl) = credentials else {
            return None;
        };
        let mut tls = ClientTlsConfig::new();
        if let Some(domain) = &options.ssl_target_name_override {
            tls = tls.domain_name(domain.clone());
        }
        tls = match &ssl.root_certificate {
            Some(root) => tls.ca_certificate(Certificate::from_pem(root)),
            None => tls.with_native_roots(),
        };
        if let (Some(cert), Some(key)) = (&ssl.certificate_chain, &ssl.private_key) {
            tls = tls.identity(Identity::from_pem(cert, key));
        }
        Some(tls)
    }
}

impl ChannelFactory for TonicChannelFactory {
    fn create_channel(
        &self,
        address: &str,
        credentials: &ChannelCredentials,
        options: &ChannelOptions,
    ) -> Result<Arc<dyn GrpcChannel>> {
        let uri = Self::endpoint_uri(address, credentials.is_secure());
        let mut endpoint =
            Endpoint::from_shared(uri.clone()).map_err(|e| BifrostError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        if let Some(tls) = Self::tls_config(credentials, options) {
            endpoint = endpoint.tls_config(tls)?;
        }
        if let Some(timeout) = options.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        if let Some(timeout) = options.timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if let Some(user_agent) = &options.user_agent {
            endpoint = endpoint.user_agent(user_agent.clone())?;
        }
        debug!(uri = %uri, secure = credentials.is_secure(), "created channel");
        Ok(Arc::new(TonicChannel {
            channel: endpoint.connect_lazy(),
        }))
    }
}

/// [`GrpcChannel`] over a `tonic` transport channel.
#[derive(Debug, Clone)]
pub struct TonicChannel {
    channel: Channel,
}

impl TonicChannel {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    async fn client(&self) -> std::result::Result<Grpc<Channel>, Status> {
        let mut client = Grpc::new(self.channel.clone());
        client
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("channel not ready: {e}")))?;
        Ok(client)
    }
}

fn request<T>(message: T, metadata: MetadataMap) -> Request<T> {
    let mut request = Request::new(message);
    *request.metadata_mut() = metadata;
    request
}

#[async_trait]
impl GrpcChannel for TonicChannel {
    async fn unary(
        &self,
        method: MethodDescriptor,
        payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status> {
        let path = codec::path_and_query(&method)?;
        let mut client = self.client().await?;
        let response = client
            .unary(request(payload, metadata), path, JsonCodec::new(&method))
            .await?;
        Ok(response.into_inner())
    }

    async fn client_streaming(
        &self,
        method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<Value, Status> {
        let path = codec::path_and_query(&method)?;
        let mut client = self.client().await?;
        let response = client
            .client_streaming(request(requests, metadata), path, JsonCodec::new(&method))
            .await?;
        Ok(response.into_inner())
    }

    async fn server_streaming(
        &self,
        method: MethodDescriptor,
        payload: Value,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status> {
        let path = codec::path_and_query(&method)?;
        let mut client = self.client().await?;
        let response = client
            .server_streaming(request(payload, metadata), path, JsonCodec::new(&method))
            .await?;
        Ok(Box::pin(response.into_inner()))
    }

    async fn streaming(
        &self,
        method: MethodDescriptor,
        requests: RequestStream,
        metadata: MetadataMap,
    ) -> std::result::Result<ResponseStream, Status> {
        let path = codec::path_and_query(&method)?;
        let mut client = self.client().await?;
        let response = client
            .streaming(request(requests, metadata), path, JsonCodec::new(&method))
            .await?;
        Ok(Box::pin(response.into_inner()))
    }
}
