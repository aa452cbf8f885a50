//! JSON ⇄ protobuf transcoding.
//!
//! Payloads travel through the crate as `serde_json::Value` and are turned
//! into protobuf bytes with `prost-reflect` dynamic messages, using the
//! message descriptors of the resolved method. [`JsonCodec`] plugs the same
//! conversion into `tonic`'s generic client.

use bytes::Bytes;
use http::uri::PathAndQuery;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor, SerializeOptions};
use serde_json::Value;
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};

use crate::{BifrostError, Result};

/// JSON rendering: proto field names, defaults included, 64-bit integers as strings.
fn json_options() -> SerializeOptions {
    SerializeOptions::new()
        .use_proto_field_name(true)
        .skip_default_fields(false)
        .stringify_64_bit_integers(true)
}

/// Build a dynamic message from a JSON payload.
pub fn to_message(descriptor: &MessageDescriptor, payload: &Value) -> Result<DynamicMessage> {
    DynamicMessage::deserialize(descriptor.clone(), payload).map_err(|e| {
        BifrostError::InvalidPayload {
            message: descriptor.full_name().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Render a dynamic message as JSON.
pub fn to_json(message: &DynamicMessage) -> std::result::Result<Value, serde_json::Error> {
    message.serialize_with_options(serde_json::value::Serializer, &json_options())
}

/// Encode a JSON payload as protobuf bytes.
pub fn encode_json(descriptor: &MessageDescriptor, payload: &Value) -> Result<Bytes> {
    Ok(to_message(descriptor, payload)?.encode_to_vec().into())
}

/// Decode protobuf bytes into JSON. Failures are reported as an `INTERNAL` status.
pub fn decode_json(descriptor: &MessageDescriptor, bytes: &[u8]) -> std::result::Result<Value, Status> {
    let message = DynamicMessage::decode(descriptor.clone(), bytes)
        .map_err(|e| Status::internal(format!("failed to decode response: {e}")))?;
    to_json(&message).map_err(|e| Status::internal(format!("failed to render response: {e}")))
}

/// HTTP path of a method: `/<package.Service>/<Method>`.
pub fn method_path(method: &MethodDescriptor) -> String {
    format!("/{}/{}", method.parent_service().full_name(), method.name())
}

/// [`method_path`] as a request URI path.
pub fn path_and_query(method: &MethodDescriptor) -> std::result::Result<PathAndQuery, Status> {
    PathAndQuery::try_from(method_path(method))
        .map_err(|e| Status::internal(format!("invalid method path: {e}")))
}

/// `tonic` codec carrying JSON values for one method.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    input: MessageDescriptor,
    output: MessageDescriptor,
}

impl JsonCodec {
    pub fn new(method: &MethodDescriptor) -> Self {
        Self {
            input: method.input(),
            output: method.output(),
        }
    }
}

impl Codec for JsonCodec {
    type Encode = Value;
    type Decode = Value;
    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(self.input.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(self.output.clone())
    }
}

#[derive(Debug)]
pub struct JsonEncoder(MessageDescriptor);

impl Encoder for JsonEncoder {
    type Item = Value;
    type Error = Status;

    fn encode(&mut self, item: Value, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Status> {
        let message = to_message(&self.0, &item).map_err(|e| Status::invalid_argument(e.to_string()))?;
        message
            .encode(dst)
            .map_err(|e| Status::internal(format!("failed to encode request: {e}")))
    }
}

#[derive(Debug)]
pub struct JsonDecoder(MessageDescriptor);

impl Decoder for JsonDecoder {
    type Item = Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Value>, Status> {
        let message = DynamicMessage::decode(self.0.clone(), src)
            .map_err(|e| Status::internal(format!("failed to decode response: {e}")))?;
        to_json(&message)
            .map(Some)
            .map_err(|e| Status::internal(format!("failed to render response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::loader::{PackageDefinition, fixtures};
    use crate::types::RequestOptions;

    fn unary() -> MethodDescriptor {
        PackageDefinition::from_file_descriptor_set(fixtures::simple_service())
            .unwrap()
            .resolve(&RequestOptions::new(
                "simple_package.v1.SimpleService",
                "SimpleUnaryRequest",
            ))
            .unwrap()
    }

    #[test]
    fn encode_then_decode_keeps_fields() {
        let method = unary();
        let bytes = encode_json(&method.input(), &json!({"id": "abc"})).unwrap();
        let value = decode_json(&method.output(), &bytes).unwrap();
        assert_eq!(value, json!({"id": "abc"}));
    }

    #[test]
    fn defaults_are_rendered() {
        let method = unary();
        let value = decode_json(&method.output(), &[]).unwrap();
        assert_eq!(value, json!({"id": ""}));
    }

    #[test]
    fn unknown_field_is_invalid_payload() {
        let method = unary();
        let err = encode_json(&method.input(), &json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, BifrostError::InvalidPayload { .. }));
    }

    #[test]
    fn garbage_bytes_are_internal() {
        let method = unary();
        let status = decode_json(&method.output(), &[0x0a, 0xff]).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn path_uses_full_service_name() {
        let path = path_and_query(&unary()).unwrap();
        assert_eq!(
            path.as_str(),
            "/simple_package.v1.SimpleService/SimpleUnaryRequest"
        );
    }
}
