//! Canonical URL keys.
//!
//! Collapses requests that differ only in host case, surrounding whitespace
//! or fragment onto one cache entry. Query strings are kept as sent.

use bytes::Bytes;
use http::Request;

use super::KeyGenerator;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Key on the canonical form of the request URI.
///
/// URIs that fail to canonicalize (relative URIs, odd schemes) fall back to
/// the verbatim URI string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalUrlKey;

impl KeyGenerator for CanonicalUrlKey {
    fn key(&self, req: &Request<Bytes>) -> String {
        let raw = req.uri().to_string();
        match canonicalize(&raw) {
            Ok(url) => url.to_string(),
            Err(_) => raw,
        }
    }
}
