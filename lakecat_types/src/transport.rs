//! The request/response seam between the catalog client and a catalog service
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use thiserror::Error;

/// Failures to exchange a request with a catalog service
///
/// Error responses of the service are not transport errors, they arrive as a [`Response`] with
/// a non-success status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to send {method} {path} request: {source}")]
    Send {
        method: http::Method,
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to read the response body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Carries a request to a catalog service and returns its response
///
/// The request URI holds the path and query only, the transport decides where it goes.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}
