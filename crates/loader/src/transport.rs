//! Network transport.

use crate::error::{Error, ErrorKind, Result};
use crate::request::Request;
use async_trait::async_trait;
use exn::{Exn, ResultExt};
use marquee_config::TransportConfig;
use std::sync::Arc;

pub type TransportHandle = Arc<dyn Transport>;

/// Performs a single network request and returns the response body.
///
/// Non-success statuses are errors. Implementations never cache and never
/// retry; both are the loader's business.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: &Request) -> Result<Vec<u8>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}
impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .or_raise(|| ErrorKind::Transport("could not build HTTP client".to_string()))?;
        Ok(Self { client })
    }

    #[track_caller]
    fn raise(err: reqwest::Error) -> Error {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if let Some(status) = err.status() {
            ErrorKind::Status(status.as_u16())
        } else if err.is_decode() || err.is_body() {
            ErrorKind::Transport(format!("could not read response body: {err}"))
        } else {
            ErrorKind::Transport(err.to_string())
        };
        Exn::new(err).raise(kind)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(level = "debug", skip_all, fields(method = %request.method(), url = %request.url()))]
    async fn send(&self, request: &Request) -> Result<Vec<u8>> {
        let response = self
            .client
            .request(request.method().clone(), request.url().clone())
            .send()
            .await
            .map_err(Self::raise)?;
        let response = response.error_for_status().map_err(Self::raise)?;
        let body = response.bytes().await.map_err(Self::raise)?;
        tracing::debug!(size = body.len(), "Received response");
        Ok(body.to_vec())
    }
}
