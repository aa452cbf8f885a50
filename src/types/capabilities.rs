//! Transport capability reporting

use serde::{Deserialize, Serialize};

use crate::loader::CallShape;

/// Which call shapes a protocol adapter can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Single request, single response.
    pub unary: bool,
    /// Request stream, single response.
    pub client_streaming: bool,
    /// Single request, response stream.
    pub server_streaming: bool,
    /// Request stream and response stream.
    pub bidirectional_streaming: bool,
}

impl Capabilities {
    /// Every call shape (native gRPC).
    pub fn full() -> Self {
        Self {
            unary: true,
            client_streaming: true,
            server_streaming: true,
            bidirectional_streaming: true,
        }
    }

    /// Request/response and server push only (gRPC-Web).
    pub fn server_push_only() -> Self {
        Self {
            unary: true,
            server_streaming: true,
            ..Default::default()
        }
    }

    pub fn supports(&self, shape: CallShape) -> bool {
        match shape {
            CallShape::Unary => self.unary,
            CallShape::ClientStreaming => self.client_streaming,
            CallShape::ServerStreaming => self.server_streaming,
            CallShape::BidirectionalStreaming => self.bidirectional_streaming,
        }
    }
}
