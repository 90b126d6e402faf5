//! HTTP transport seam.
//!
//! # Responsibilities
//! - Issue exactly one request and return status, headers and body
//! - Map client failures into `TransportError`
//!
//! # Design Decisions
//! - No retries here; the retry loop lives in `client.rs`
//! - Trait object friendly (`BoxFuture`) so tests can script responses

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::shop::types::{TransportError, UpstreamRequest, UpstreamResponse};

/// Sends a single HTTP request.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> BoxFuture<'_, Result<UpstreamResponse, TransportError>>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (connection pool, proxy settings).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse { status, headers, body })
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> BoxFuture<'_, Result<UpstreamResponse, TransportError>> {
        self.execute(request).boxed()
    }
}
