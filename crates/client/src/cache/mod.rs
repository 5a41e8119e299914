//! Caching decision engine.
//!
//! [`HttpCache::execute`] sits in front of a [`Transport`]. Non-GET requests
//! pass straight through. For GET requests the engine:
//!
//! 1. Derives the cache key.
//! 2. Reads the stored entry, unless the ignore-cache override is set.
//! 3. Serves fresh entries, and expired ones under ignore-expired.
//! 4. Under only-cached, serves whatever entry it has or fails with a miss.
//! 5. Otherwise sends the request, with `If-None-Match` when the entry has
//!    an ETag, and reconciles a 304 against the stored entry or stores the
//!    new response.

pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, Request, Response, StatusCode};

use cachet_core::{
    CacheConfig, CacheEntry, Error, Field, KeyGenerator, LogSink, NoopSink, StorageProvider, UrlKey, cache_flags,
};

use crate::transport::{ReqwestTransport, Transport, TransportConfig};

pub use state::CacheState;
use state::Report;

/// Headers carried from the stored entry onto a 304 response.
const REFRESHED_HEADERS: [header::HeaderName; 2] = [header::EXPIRES, header::LAST_MODIFIED];

/// Transparent response cache in front of a transport.
///
/// Holds no per-request state; concurrent calls for the same key each fetch
/// and the last write wins.
#[derive(Clone)]
pub struct HttpCache {
    provider: Arc<dyn StorageProvider>,
    transport: Arc<dyn Transport>,
    key_generator: Arc<dyn KeyGenerator>,
    sink: Arc<dyn LogSink>,
    ttl_hint: Duration,
}

impl HttpCache {
    /// Cache over `provider`, sending through `transport`.
    ///
    /// Keys default to the request URI, logging is off, and no TTL hint is
    /// passed to the provider.
    pub fn new(provider: impl StorageProvider + 'static, transport: impl Transport + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            transport: Arc::new(transport),
            key_generator: Arc::new(UrlKey),
            sink: Arc::new(NoopSink),
            ttl_hint: Duration::ZERO,
        }
    }

    /// Cache over `provider` with a reqwest transport built from `config`.
    pub fn from_config(provider: impl StorageProvider + 'static, config: &CacheConfig) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(TransportConfig::from(config))?;
        Ok(Self::new(provider, transport).with_ttl_hint(config.ttl_hint()))
    }

    pub fn with_key_generator(mut self, key_generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Arc::new(key_generator);
        self
    }

    pub fn with_log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// TTL hint passed to the provider on every write.
    pub fn with_ttl_hint(mut self, ttl_hint: Duration) -> Self {
        self.ttl_hint = ttl_hint;
        self
    }

    /// Serve `req` from the cache or the transport.
    ///
    /// Emits one `cache.execute` debug event per call, preceded by an error
    /// event when the call fails.
    pub async fn execute(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let mut report = Report::new(req.uri().to_string());

        let result = self.run(req, &mut report).await;

        if let Err(err) = &result {
            let mut fields = vec![Field::new("url", &report.url)];
            if let Some(key) = &report.key {
                fields.push(Field::new("cache_key", key));
            }
            fields.push(Field::new("error", err));
            self.sink.error("cache.execute", &fields);
        }
        self.sink.debug("cache.execute", &report.fields());

        result
    }

    async fn run(&self, mut req: Request<Bytes>, report: &mut Report) -> Result<Response<Bytes>, Error> {
        if req.method() != Method::GET {
            return self.dispatch(req, report).await;
        }

        let flags = cache_flags(&req);
        let key = self.key_generator.key(&req);
        report.key = Some(key.clone());

        let mut entry = None;

        if flags.ignore_cache {
            report.state = Some(CacheState::Ignored);
        } else {
            match self.read(&key).await? {
                None => report.state = Some(CacheState::Miss),
                Some(found) if !found.is_expired() => {
                    report.state = Some(CacheState::Hit);
                    return Ok(found.to_response());
                }
                Some(found) if flags.ignore_expired => {
                    report.state = Some(CacheState::IgnoredExpiry);
                    return Ok(found.to_response());
                }
                Some(found) => {
                    report.state = Some(CacheState::Expired);
                    entry = Some(found);
                }
            }
        }

        if flags.only_cached {
            report.state = Some(CacheState::IgnoredCheck);
            return match entry {
                Some(found) => Ok(found.to_response()),
                None => Err(Error::CacheMiss(key)),
            };
        }

        if let Some(etag) = entry.as_ref().and_then(CacheEntry::etag)
            && let Ok(value) = HeaderValue::from_str(etag)
        {
            req.headers_mut().insert(header::IF_NONE_MATCH, value);
        }

        let response = self.dispatch(req, report).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            let Some(entry) = entry else {
                return Err(Error::NotModifiedWithoutEntry(key));
            };
            return self.reconcile_not_modified(&key, entry, response).await;
        }

        let (parts, body) = response.into_parts();
        let fresh = CacheEntry::capture(parts.status, &parts.headers, body);
        self.write(&key, &fresh).await?;

        Ok(fresh.to_response())
    }

    /// Send through the transport, recording timing and status.
    async fn dispatch(&self, req: Request<Bytes>, report: &mut Report) -> Result<Response<Bytes>, Error> {
        let start = Instant::now();
        let response = self.transport.send(req).await?;
        report.elapsed = Some(start.elapsed());
        report.status = Some(response.status());
        Ok(response)
    }

    /// Answer a 304 with the stored body, refreshing the stored freshness headers.
    async fn reconcile_not_modified(
        &self,
        key: &str,
        entry: CacheEntry,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        let (mut parts, _) = response.into_parts();

        for name in REFRESHED_HEADERS {
            if let Some(value) = entry.header(name.as_str())
                && let Ok(value) = HeaderValue::from_str(value)
            {
                parts.headers.insert(name, value);
            }
        }

        self.write(key, &entry).await?;

        Ok(Response::from_parts(parts, entry.body))
    }

    /// Load the entry for `key`; undecodable entries read as absent.
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let Some(bytes) = self.provider.get(key).await? else {
            return Ok(None);
        };

        match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.has_valid_status() => Ok(Some(entry)),
            Ok(entry) => {
                self.sink.info(
                    "cache.malformed_entry",
                    &[Field::new("cache_key", key), Field::new("error", format!("invalid status {}", entry.status_code))],
                );
                Ok(None)
            }
            Err(e) => {
                self.sink
                    .info("cache.malformed_entry", &[Field::new("cache_key", key), Field::new("error", e)]);
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), Error> {
        let bytes = entry.encode()?;
        self.provider.set(key, bytes, self.ttl_hint).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
