//! Transports: anything that turns a request into a response.
//!
//! The cache only needs `send`. [`ReqwestTransport`] is the network-backed
//! implementation:
//!
//! - Follows up to `max_redirects` redirects (default: 5)
//! - Enforces a request timeout (default: 20s)
//! - Reads the whole body, rejecting bodies over `max_bytes` (default: 5MB)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use reqwest::Client;

use cachet_core::{CacheConfig, TransportError};

/// Sends one request and returns the complete response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        (**self).send(req).await
    }
}

/// Configuration for the reqwest transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "cachet/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "cachet/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&CacheConfig> for TransportConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP transport backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let start = Instant::now();
        let method = req.method().clone();
        let request = reqwest::Request::try_from(req).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let url = request.url().clone();

        let response = self.http.execute(request).await.map_err(map_reqwest_error)?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(TransportError::TooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(TransportError::TooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            method,
            url,
            status.as_u16(),
            start.elapsed().as_millis(),
            bytes.len()
        );

        let mut out = Response::new(bytes);
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
