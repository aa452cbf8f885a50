//! Request lookup key

use serde::{Deserialize, Serialize};

/// Identifies the method to invoke within the loaded definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Fully-qualified service name, e.g. `simple_package.v1.SimpleService`,
    /// or just `SimpleService` when the schema declares no package.
    pub service: String,
    /// Method name, e.g. `SimpleUnaryRequest`.
    pub method: String,
}

impl RequestOptions {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}
