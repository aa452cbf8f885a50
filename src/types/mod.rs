//! Public types for the Bifrost API.

mod capabilities;
mod metadata;
mod request;
mod response;
mod status;
mod tls;

pub use capabilities::Capabilities;
pub(crate) use metadata::is_binary_key;
pub use metadata::{Metadata, MetadataValue};
pub use request::RequestOptions;
pub use response::{ErrorMetadata, ErrorValue, ResponseData, ResponseEnvelope, header_metadata};
pub use status::StatusCode;
pub use tls::TlsConfig;
