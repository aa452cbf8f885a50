//! The normalized response envelope

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::StatusCode;

/// Error metadata, one entry per header name with every value it carried.
pub type ErrorMetadata = BTreeMap<String, Vec<String>>;

/// Details attached to a failed call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorValue {
    pub details: Option<String>,
    pub metadata: Option<ErrorMetadata>,
}

impl ErrorValue {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ErrorMetadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }

    /// Build from a native status. Empty message or metadata become `None`.
    pub fn from_status(status: &tonic::Status) -> Self {
        let details = (!status.message().is_empty()).then(|| status.message().to_string());
        let metadata = header_metadata(&status.metadata().clone().into_headers());
        Self {
            details,
            metadata: (!metadata.is_empty()).then_some(metadata),
        }
    }
}

/// Collect a header map into [`ErrorMetadata`], skipping the status headers
/// that are already represented by the envelope itself.
pub fn header_metadata(headers: &http::HeaderMap) -> ErrorMetadata {
    let mut metadata = ErrorMetadata::new();
    for (name, value) in headers {
        if matches!(name.as_str(), "grpc-status" | "grpc-message") {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        metadata
            .entry(name.as_str().to_string())
            .or_default()
            .push(value);
    }
    metadata
}

/// Payload half of a [`ResponseEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Value(Value),
    Error(ErrorValue),
}

/// Uniform result of a unary call or of one streamed message.
///
/// `code` is OK exactly when `data` is a decoded response value; the
/// constructors are the only way to build one, which keeps that true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    code: StatusCode,
    /// Milliseconds elapsed since the call was dispatched.
    timestamp: u64,
    data: ResponseData,
}

impl ResponseEnvelope {
    pub fn ok(value: Value, timestamp: u64) -> Self {
        Self {
            code: StatusCode::Ok,
            timestamp,
            data: ResponseData::Value(value),
        }
    }

    /// A failed outcome. A failure reported with code OK carried no real
    /// status and is recorded as `Unknown`.
    pub fn failure(code: StatusCode, timestamp: u64, error: ErrorValue) -> Self {
        let code = if code.is_ok() {
            StatusCode::Unknown
        } else {
            code
        };
        Self {
            code,
            timestamp,
            data: ResponseData::Error(error),
        }
    }

    pub fn from_status(status: &tonic::Status, timestamp: u64) -> Self {
        Self::failure(
            status.code().into(),
            timestamp,
            ErrorValue::from_status(status),
        )
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn data(&self) -> &ResponseData {
        &self.data
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.data {
            ResponseData::Value(value) => Some(value),
            ResponseData::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorValue> {
        match &self.data {
            ResponseData::Error(error) => Some(error),
            ResponseData::Value(_) => None,
        }
    }

    pub fn into_data(self) -> ResponseData {
        self.data
    }
}
