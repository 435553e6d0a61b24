//! Outbound HTTP transport.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{DocketError, Result};

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Trait for delivering a request body to the registration endpoint.
///
/// This abstracts over the real HTTP client so the submitter can be driven
/// by an in-process transport in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` and return the response, or the transport failure.
    async fn post(&self, body: String) -> Result<TransportResponse>;
}

/// Transport backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// Fails if the endpoint is not an absolute http(s) URL or the client
    /// cannot be built.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, endpoint })
    }

    /// The endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: String) -> Result<TransportResponse> {
        debug!(endpoint = %self.endpoint, bytes = body.len(), "Sending request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Parse and check a registration endpoint URL.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|source| DocketError::InvalidEndpoint {
        url: endpoint.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DocketError::Config(format!(
            "endpoint '{}' uses unsupported scheme '{}'",
            endpoint, other
        ))),
    }
}
