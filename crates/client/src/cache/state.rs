//! Outcome tags reported for each cached request.

use std::fmt;
use std::time::Duration;

use http::StatusCode;

use cachet_core::Field;

/// How the engine resolved a GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Fresh entry served, no network call.
    Hit,
    /// No usable entry; fetched.
    Miss,
    /// Entry found but expired; revalidated or refetched.
    Expired,
    /// Read path skipped by the ignore-cache override.
    Ignored,
    /// Expired entry served under the ignore-expired override.
    IgnoredExpiry,
    /// Network skipped by the only-cached override.
    IgnoredCheck,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Hit => "hit",
            CacheState::Miss => "miss",
            CacheState::Expired => "expired",
            CacheState::Ignored => "ignored",
            CacheState::IgnoredExpiry => "ignored_expiry",
            CacheState::IgnoredCheck => "ignored_check",
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts gathered while handling one request, emitted as the completion event.
#[derive(Debug, Default)]
pub(crate) struct Report {
    pub url: String,
    pub key: Option<String>,
    pub state: Option<CacheState>,
    pub elapsed: Option<Duration>,
    pub status: Option<StatusCode>,
}

impl Report {
    pub fn new(url: String) -> Self {
        Self { url, ..Default::default() }
    }

    pub fn fields(&self) -> Vec<Field> {
        let mut fields = vec![Field::new("url", &self.url)];
        if let Some(key) = &self.key {
            fields.push(Field::new("cache_key", key));
        }
        if let Some(state) = self.state {
            fields.push(Field::new("cache", state));
        }
        if let Some(elapsed) = self.elapsed {
            fields.push(Field::new("elapsed_ms", elapsed.as_millis()));
        }
        if let Some(status) = self.status {
            fields.push(Field::new("status", status.as_u16()));
        }
        fields
    }
}
