// HTTP transport seam used by the Last.fm client

use anyhow::{Context, Result};
use std::time::Duration;

/// A single outgoing HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Raw HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking "send request, get bytes or error" capability.
///
/// Implementations are called from the runtime's blocking pool, never from
/// an async task directly.
pub trait Transport: Send + Sync {
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by attohttpc
#[derive(Debug, Default, Clone)]
pub struct AttoTransport;

impl Transport for AttoTransport {
    fn post(&self, request: &HttpRequest) -> Result<HttpResponse> {
        log::debug!("POST {} ({} params)", request.url, request.params.len());

        let response = attohttpc::post(&request.url)
            .params(request.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .connect_timeout(request.timeout)
            .read_timeout(request.timeout)
            .timeout(request.timeout)
            .send()
            .with_context(|| format!("Failed to send request to {}", request.url))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .context("Failed to read response body")?;

        Ok(HttpResponse { status, body })
    }
}
