//! Cache key derivation.
//!
//! The default key is the full request URI, with no normalization. Other
//! generators deliberately make distinct requests share a key; callers who
//! install them own the collision semantics.

pub mod hash;
pub mod url;

use bytes::Bytes;
use http::Request;

pub use hash::HashedKey;
pub use url::{CanonicalUrlKey, UrlError, canonicalize};

/// Derives the storage key for a request.
pub trait KeyGenerator: Send + Sync {
    fn key(&self, req: &Request<Bytes>) -> String;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Request<Bytes>) -> String + Send + Sync,
{
    fn key(&self, req: &Request<Bytes>) -> String {
        self(req)
    }
}

/// The request URI, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlKey;

impl KeyGenerator for UrlKey {
    fn key(&self, req: &Request<Bytes>) -> String {
        req.uri().to_string()
    }
}
