//! Hashed cache keys for backends with key length or charset limits.

use bytes::Bytes;
use http::Request;
use sha2::{Digest, Sha256};

use super::{KeyGenerator, UrlKey};

/// SHA-256 hex digest of another generator's key.
#[derive(Debug, Clone, Default)]
pub struct HashedKey<G = UrlKey> {
    inner: G,
}

impl<G> HashedKey<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

impl<G: KeyGenerator> KeyGenerator for HashedKey<G> {
    fn key(&self, req: &Request<Bytes>) -> String {
        compute_key_hash(&self.inner.key(req))
    }
}

/// Hex-encoded SHA-256 of a raw key.
pub fn compute_key_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
