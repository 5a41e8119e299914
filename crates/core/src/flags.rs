//! Per-request cache overrides.
//!
//! Each override is its own typed value in the request's
//! [`http::Extensions`], so they can be set and read independently of each
//! other and of any unrelated extension. A missing flag reads as `false`.

use http::Extensions;

/// Serve an expired entry as if it were fresh, without refreshing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreExpired(pub bool);

/// Skip the read path and always fetch. The response is still stored.
///
/// Takes precedence over [`IgnoreExpired`]: no entry is read, so its expiry
/// never comes up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreCache(pub bool);

/// Never touch the network; a missing entry becomes a cache-miss error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OnlyCached(pub bool);

/// Snapshot of the three overrides as read from one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheFlags {
    pub ignore_expired: bool,
    pub ignore_cache: bool,
    pub only_cached: bool,
}

impl CacheFlags {
    pub fn from_extensions(ext: &Extensions) -> Self {
        Self {
            ignore_expired: ext.get::<IgnoreExpired>().is_some_and(|f| f.0),
            ignore_cache: ext.get::<IgnoreCache>().is_some_and(|f| f.0),
            only_cached: ext.get::<OnlyCached>().is_some_and(|f| f.0),
        }
    }
}

/// Builder-style access to the cache overrides on requests.
pub trait CacheFlagsExt: Sized {
    fn with_ignore_expired(self, ignore: bool) -> Self;
    fn with_ignore_cache(self, ignore: bool) -> Self;
    fn with_only_cached(self, only: bool) -> Self;
}

impl<B> CacheFlagsExt for http::Request<B> {
    fn with_ignore_expired(mut self, ignore: bool) -> Self {
        self.extensions_mut().insert(IgnoreExpired(ignore));
        self
    }

    fn with_ignore_cache(mut self, ignore: bool) -> Self {
        self.extensions_mut().insert(IgnoreCache(ignore));
        self
    }

    fn with_only_cached(mut self, only: bool) -> Self {
        self.extensions_mut().insert(OnlyCached(only));
        self
    }
}

impl CacheFlagsExt for http::request::Builder {
    fn with_ignore_expired(self, ignore: bool) -> Self {
        self.extension(IgnoreExpired(ignore))
    }

    fn with_ignore_cache(self, ignore: bool) -> Self {
        self.extension(IgnoreCache(ignore))
    }

    fn with_only_cached(self, only: bool) -> Self {
        self.extension(OnlyCached(only))
    }
}

/// Read the overrides carried by a request.
pub fn cache_flags<B>(req: &http::Request<B>) -> CacheFlags {
    CacheFlags::from_extensions(req.extensions())
}
