use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use http::HeaderMap;

use cachet_core::entry::format_http_date;
use cachet_core::{CacheFlagsExt, Level, MemoryProvider, StorageError, TransportError};

use super::*;

const REGULAR_URL: &str = "http://example.com/";
const EXPIRED_URL: &str = "http://example.com/alwaysExpired";
const NON_EXISTING_URL: &str = "http://example.com/nonExisting";
const ETAG: &str = "\"123456789\"";

/// Serves canned entries by URL and records every request it sees.
#[derive(Clone, Default)]
struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    data: HashMap<String, CacheEntry>,
    requests: Vec<(Method, String, HeaderMap)>,
    fail: bool,
}

impl FakeTransport {
    fn with(entries: impl IntoIterator<Item = (&'static str, CacheEntry)>) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().data = entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        transport
    }

    fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    fn last_request_headers(&self) -> HeaderMap {
        self.state.lock().unwrap().requests.last().unwrap().2.clone()
    }

    fn update(&self, url: &str, f: impl FnOnce(&mut CacheEntry)) {
        f(self.state.lock().unwrap().data.get_mut(url).unwrap());
    }

    fn set_failing(&self) {
        self.state.lock().unwrap().fail = true;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        // let concurrent callers interleave
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state
            .requests
            .push((req.method().clone(), req.uri().to_string(), req.headers().clone()));
        if state.fail {
            return Err(TransportError::Network("connection refused".to_string()));
        }

        match state.data.get(&req.uri().to_string()) {
            Some(entry) => Ok(entry.to_response()),
            None => {
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
        }
    }
}

/// Provider whose reads or writes can be made to fail.
#[derive(Default)]
struct FlakyProvider {
    inner: MemoryProvider,
    fail_get: bool,
    fail_set: bool,
}

#[async_trait]
impl StorageProvider for FlakyProvider {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        if self.fail_get {
            return Err(StorageError::Unavailable("read refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
        if self.fail_set {
            return Err(StorageError::Backend("write refused".to_string()));
        }
        self.inner.set(key, value, ttl_hint).await
    }
}

/// Records events as `LEVEL message k=v ...` lines.
#[derive(Clone, Default)]
struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    fn text(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }

    fn count(&self, level: Level) -> usize {
        let prefix = format!("{level} ");
        self.lines.lock().unwrap().iter().filter(|l| l.starts_with(&prefix)).count()
    }

    fn reset(&self) {
        self.lines.lock().unwrap().clear();
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let mut line = format!("{level} {message}");
        for field in fields {
            line.push(' ');
            line.push_str(&field.to_string());
        }
        self.lines.lock().unwrap().push(line);
    }
}

fn entry(body: &str, expires_in: chrono::Duration, etag: Option<&str>) -> CacheEntry {
    let mut headers = BTreeMap::new();
    headers.insert("expires".to_string(), format_http_date(Utc::now() + expires_in));
    if let Some(etag) = etag {
        headers.insert("etag".to_string(), etag.to_string());
    }
    CacheEntry { captured_at: Utc::now(), status_code: 200, body: Bytes::from(body.to_string()), headers }
}

fn fresh(body: &str) -> CacheEntry {
    entry(body, chrono::Duration::hours(1), None)
}

fn expired(body: &str) -> CacheEntry {
    entry(body, -chrono::Duration::hours(1), None)
}

fn get(url: &str) -> Request<Bytes> {
    Request::get(url).body(Bytes::new()).unwrap()
}

fn default_transport() -> FakeTransport {
    FakeTransport::with([(REGULAR_URL, fresh("Hello World")), (EXPIRED_URL, expired("Hello World"))])
}

#[tokio::test]
async fn test_regular_request_then_hit() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    let response = cache.execute(get(REGULAR_URL)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);

    let response = cache.execute(get(REGULAR_URL)).await.unwrap();
    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_repeated_hits_never_fetch() {
    let provider = MemoryProvider::new();
    provider
        .set(REGULAR_URL, fresh("Hello World").encode().unwrap(), Duration::ZERO)
        .await
        .unwrap();
    let transport = FakeTransport::default();
    let cache = HttpCache::new(provider, transport.clone());

    for _ in 0..5 {
        let response = cache.execute(get(REGULAR_URL)).await.unwrap();
        assert_eq!(response.body().as_ref(), b"Hello World");
    }
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_ignore_cache_always_fetches() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let initial = transport.request_count();

    for i in 1..=3 {
        cache
            .execute(get(REGULAR_URL).with_ignore_cache(true))
            .await
            .unwrap();
        assert_eq!(transport.request_count(), initial + i);
    }
}

#[tokio::test]
async fn test_ignore_cache_still_writes_back() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache
        .execute(get(REGULAR_URL).with_ignore_cache(true))
        .await
        .unwrap();
    cache.execute(get(REGULAR_URL)).await.unwrap();

    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_ignore_cache_precedes_ignore_expired() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(EXPIRED_URL)).await.unwrap();
    cache
        .execute(get(EXPIRED_URL).with_ignore_cache(true).with_ignore_expired(true))
        .await
        .unwrap();

    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_ignore_expired_serves_stale() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    // nothing stored yet, so the first call still fetches
    cache
        .execute(get(EXPIRED_URL).with_ignore_expired(true))
        .await
        .unwrap();
    assert_eq!(transport.request_count(), 1);

    let response = cache
        .execute(get(EXPIRED_URL).with_ignore_expired(true))
        .await
        .unwrap();
    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_expired_entry_refetches_without_override() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(EXPIRED_URL)).await.unwrap();
    cache.execute(get(EXPIRED_URL)).await.unwrap();

    assert_eq!(transport.request_count(), 2);
    assert!(transport.last_request_headers().get(header::IF_NONE_MATCH).is_none());
}

#[tokio::test]
async fn test_only_cached_miss() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    let err = cache
        .execute(get(NON_EXISTING_URL).with_only_cached(true))
        .await
        .unwrap_err();

    assert!(err.is_cache_miss());
    assert!(matches!(err, Error::CacheMiss(key) if key == NON_EXISTING_URL));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_only_cached_serves_expired_entry() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(EXPIRED_URL)).await.unwrap();
    let response = cache
        .execute(get(EXPIRED_URL).with_only_cached(true))
        .await
        .unwrap();

    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_only_cached_with_ignore_cache_is_miss() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let err = cache
        .execute(get(REGULAR_URL).with_ignore_cache(true).with_only_cached(true))
        .await
        .unwrap_err();

    assert!(err.is_cache_miss());
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_etag_sent_as_if_none_match() {
    let transport = FakeTransport::with([(REGULAR_URL, entry("Hello World", -chrono::Duration::hours(1), Some(ETAG)))]);
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    assert!(transport.last_request_headers().get(header::IF_NONE_MATCH).is_none());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    assert_eq!(transport.request_count(), 2);
    assert_eq!(transport.last_request_headers().get(header::IF_NONE_MATCH).unwrap(), ETAG);
}

#[tokio::test]
async fn test_not_modified_returns_stored_body() {
    let transport = FakeTransport::with([(REGULAR_URL, entry("Hello World", -chrono::Duration::hours(1), Some(ETAG)))]);
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();

    transport.update(REGULAR_URL, |e| {
        e.status_code = 304;
        e.body = Bytes::new();
        e.headers.insert("expires".to_string(), "Thu, 01 Jan 2099 00:00:00 GMT".to_string());
        e.headers.insert("x-origin".to_string(), "304".to_string());
    });

    let response = cache.execute(get(REGULAR_URL)).await.unwrap();

    assert_eq!(transport.request_count(), 2);
    assert_eq!(transport.last_request_headers().get(header::IF_NONE_MATCH).unwrap(), ETAG);
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.body().as_ref(), b"Hello World");
    // stored freshness headers win over the ones on the 304
    assert_ne!(response.headers().get(header::EXPIRES).unwrap(), "Thu, 01 Jan 2099 00:00:00 GMT");
    assert_eq!(response.headers().get("x-origin").unwrap(), "304");
}

#[tokio::test]
async fn test_not_modified_keeps_stored_entry() {
    let provider = MemoryProvider::new();
    let transport = FakeTransport::with([(REGULAR_URL, entry("Hello World", -chrono::Duration::hours(1), Some(ETAG)))]);
    let cache = HttpCache::new(provider.clone(), transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let before = provider.get(REGULAR_URL).await.unwrap().unwrap();

    transport.update(REGULAR_URL, |e| {
        e.status_code = 304;
        e.body = Bytes::new();
    });
    cache.execute(get(REGULAR_URL)).await.unwrap();

    let after = provider.get(REGULAR_URL).await.unwrap().unwrap();
    assert_eq!(CacheEntry::decode(&before).unwrap(), CacheEntry::decode(&after).unwrap());
}

#[tokio::test]
async fn test_not_modified_without_entry_is_fatal() {
    let mut not_modified = fresh("");
    not_modified.status_code = 304;
    let transport = FakeTransport::with([(REGULAR_URL, not_modified)]);
    let cache = HttpCache::new(MemoryProvider::new(), transport);

    let err = cache.execute(get(REGULAR_URL)).await.unwrap_err();
    assert!(matches!(err, Error::NotModifiedWithoutEntry(_)));
}

#[tokio::test]
async fn test_constant_key_generator_collapses_urls() {
    let url1 = "http://example.com/1";
    let url2 = "http://example.com/2";
    let transport = FakeTransport::with([
        (url1, entry("Hello World", chrono::Duration::hours(1), Some(ETAG))),
        (url2, entry("Should not happen", chrono::Duration::hours(1), Some("abcd"))),
    ]);
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone())
        .with_key_generator(|_: &Request<Bytes>| "foo".to_string());

    cache.execute(get(url1)).await.unwrap();
    let response = cache.execute(get(url2)).await.unwrap();

    assert_eq!(transport.request_count(), 1);
    assert_eq!(response.body().as_ref(), b"Hello World");
}

#[tokio::test]
async fn test_error_statuses_are_cached() {
    let transport = FakeTransport::default();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    let response = cache.execute(get(NON_EXISTING_URL)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = cache
        .execute(get(NON_EXISTING_URL).with_only_cached(true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_non_get_passes_through() {
    let provider = MemoryProvider::new();
    let transport = default_transport();
    let cache = HttpCache::new(provider.clone(), transport.clone());

    for _ in 0..2 {
        let req = Request::post(REGULAR_URL)
            .with_only_cached(true)
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        cache.execute(req).await.unwrap();
    }

    assert_eq!(transport.request_count(), 2);
    assert!(provider.is_empty().await);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let transport = default_transport();
    transport.set_failing();
    let provider = MemoryProvider::new();
    let cache = HttpCache::new(provider.clone(), transport);

    let err = cache.execute(get(REGULAR_URL)).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Network(_))));
    assert!(provider.is_empty().await);
}

#[tokio::test]
async fn test_storage_read_error_is_surfaced() {
    let transport = default_transport();
    let provider = FlakyProvider { fail_get: true, ..Default::default() };
    let cache = HttpCache::new(provider, transport.clone());

    let err = cache.execute(get(REGULAR_URL)).await.unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Unavailable(_))));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_storage_write_error_discards_response() {
    let transport = default_transport();
    let provider = FlakyProvider { fail_set: true, ..Default::default() };
    let cache = HttpCache::new(provider, transport.clone());

    let err = cache.execute(get(REGULAR_URL)).await.unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Backend(_))));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_malformed_entry_treated_as_miss() {
    let provider = MemoryProvider::new();
    provider
        .set(REGULAR_URL, Bytes::from_static(b"{not json"), Duration::ZERO)
        .await
        .unwrap();
    let transport = default_transport();
    let sink = RecordingSink::default();
    let cache = HttpCache::new(provider.clone(), transport.clone()).with_log_sink(sink.clone());

    let response = cache.execute(get(REGULAR_URL)).await.unwrap();

    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
    assert!(sink.text().contains("INFO cache.malformed_entry"));
    assert!(sink.text().contains("cache=miss"));

    let stored = provider.get(REGULAR_URL).await.unwrap().unwrap();
    assert!(CacheEntry::decode(&stored).is_ok());
}

#[tokio::test]
async fn test_invalid_stored_status_treated_as_miss() {
    let provider = MemoryProvider::new();
    let mut bad = fresh("bad");
    bad.status_code = 42;
    provider.set(REGULAR_URL, bad.encode().unwrap(), Duration::ZERO).await.unwrap();
    let transport = default_transport();
    let cache = HttpCache::new(provider, transport.clone());

    let response = cache.execute(get(REGULAR_URL)).await.unwrap();
    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_ttl_hint_reaches_provider() {
    #[derive(Default)]
    struct TtlSpy {
        seen: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl StorageProvider for TtlSpy {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StorageError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
            self.seen.lock().unwrap().push(ttl_hint);
            Ok(())
        }
    }

    let spy = Arc::new(TtlSpy::default());
    let cache = HttpCache::new(spy.clone(), default_transport()).with_ttl_hint(Duration::from_secs(30));
    cache.execute(get(REGULAR_URL)).await.unwrap();

    let default_cache = HttpCache::new(spy.clone(), default_transport());
    default_cache.execute(get(REGULAR_URL)).await.unwrap();

    assert_eq!(*spy.seen.lock().unwrap(), vec![Duration::from_secs(30), Duration::ZERO]);
}

#[tokio::test]
async fn test_concurrent_misses_both_fetch() {
    let transport = default_transport();
    let cache = HttpCache::new(MemoryProvider::new(), transport.clone());

    let (a, b) = tokio::join!(cache.execute(get(REGULAR_URL)), cache.execute(get(REGULAR_URL)));
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn test_logging_states() {
    let transport = default_transport();
    let sink = RecordingSink::default();
    let cache = HttpCache::new(MemoryProvider::new(), transport).with_log_sink(sink.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let text = sink.text();
    assert!(text.contains("cache=miss"));
    assert!(text.contains("cache_key=http://example.com/"));
    assert!(text.contains("elapsed_ms="));
    assert!(text.contains("status=200"));
    sink.reset();

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let text = sink.text();
    assert!(text.contains("cache=hit"));
    assert!(!text.contains("elapsed_ms="));
    sink.reset();

    cache.execute(get(EXPIRED_URL)).await.unwrap();
    sink.reset();
    cache.execute(get(EXPIRED_URL)).await.unwrap();
    assert!(sink.text().contains("cache=expired"));
    sink.reset();

    cache
        .execute(get(EXPIRED_URL).with_ignore_expired(true))
        .await
        .unwrap();
    assert!(sink.text().contains("cache=ignored_expiry"));
    sink.reset();

    cache
        .execute(get(REGULAR_URL).with_ignore_cache(true))
        .await
        .unwrap();
    assert!(sink.text().contains("cache=ignored "));
    sink.reset();

    cache
        .execute(get(EXPIRED_URL).with_only_cached(true))
        .await
        .unwrap();
    assert!(sink.text().contains("cache=ignored_check"));
}

#[tokio::test]
async fn test_one_completion_event_per_call() {
    let sink = RecordingSink::default();
    let cache = HttpCache::new(MemoryProvider::new(), default_transport()).with_log_sink(sink.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    assert_eq!(sink.count(Level::Debug), 1);
    assert_eq!(sink.count(Level::Error), 0);
}

#[tokio::test]
async fn test_errors_logged_before_completion() {
    let sink = RecordingSink::default();
    let cache = HttpCache::new(MemoryProvider::new(), default_transport()).with_log_sink(sink.clone());

    let result = cache
        .execute(get(NON_EXISTING_URL).with_only_cached(true))
        .await;
    assert!(result.is_err());

    let lines = sink.lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("ERROR cache.execute"));
    assert!(lines[0].contains("CACHE_MISS"));
    assert!(lines[1].starts_with("DEBUG cache.execute"));
    assert!(lines[1].contains("cache=ignored_check"));
}

#[tokio::test]
async fn test_stored_body_survives_sqlite_round_trip() {
    let provider = cachet_core::SqliteProvider::open_in_memory().await.unwrap();
    let transport = default_transport();
    let cache = HttpCache::new(provider, transport.clone());

    cache.execute(get(REGULAR_URL)).await.unwrap();
    let response = cache.execute(get(REGULAR_URL)).await.unwrap();

    assert_eq!(response.body().as_ref(), b"Hello World");
    assert_eq!(transport.request_count(), 1);
}
