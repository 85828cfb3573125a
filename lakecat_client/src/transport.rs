use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use lakecat_types::{Transport, TransportError};
use reqwest::IntoUrl;
use url::Url;

use crate::{Error, Result};

/// A [`Transport`] that sends requests to a catalog server over HTTP
///
/// Request paths are joined onto the base URL, so any path of the base URL is replaced.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The base URL of a running catalog server
    base_url: Url,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            http_client: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |p| p.as_str().to_string());
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let resp = self
            .http_client
            .request(parts.method.clone(), url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Send {
                method: parts.method,
                path,
                source: Box::new(source),
            })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Body(Box::new(e)))?;
        let mut response = Response::new(bytes);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
