//! Client facade.
//!
//! Provides [`GrpcClient`], which composes a [`Loader`](crate::Loader) with a
//! [`Protocol`](crate::Protocol) and exposes the four call shapes.

mod grpc_client;

pub use grpc_client::GrpcClient;
