//! Cached response records.
//!
//! A [`CacheEntry`] is the snapshot of one response as handed to a storage
//! provider. Headers keep one value per name (the first one seen), and
//! freshness is judged from the `Expires` header alone.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A stored snapshot of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "ts")]
    pub captured_at: DateTime<Utc>,
    pub status_code: u16,
    #[serde(rename = "data", with = "base64_body")]
    pub body: Bytes,
    pub headers: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Snapshot a response, collapsing each header to its first value.
    pub fn capture(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self { captured_at: Utc::now(), status_code: status.as_u16(), body, headers: collapse_headers(headers) }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Non-empty entity tag, if the stored response carried one.
    pub fn etag(&self) -> Option<&str> {
        self.header(header::ETAG.as_str()).filter(|v| !v.is_empty())
    }

    /// Parsed `Expires` timestamp, `None` when missing or unparseable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.header(header::EXPIRES.as_str()).and_then(parse_http_date)
    }

    /// Whether the entry is expired at `now`.
    ///
    /// Entries without a parseable `Expires` header are always expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires) => expires < now,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Serialize to the bytes handed to a storage provider.
    pub fn encode(&self) -> Result<Bytes, Error> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::Encode(e.to_string()))
    }

    /// Deserialize bytes read back from a storage provider.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Rebuild a transport-shaped response from the stored snapshot.
    ///
    /// Stored values that are no longer valid header values are skipped.
    pub fn to_response(&self) -> Response<Bytes> {
        let mut response = Response::new(self.body.clone());
        *response.status_mut() = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str()))
            else {
                continue;
            };
            headers.insert(name, value);
        }

        response
    }

    /// Stored status is a valid HTTP status code.
    pub fn has_valid_status(&self) -> bool {
        StatusCode::from_u16(self.status_code).is_ok()
    }
}

/// Keep the first value for every header name.
pub fn collapse_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers
                .get(name)
                .map(|v| (name.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        })
        .collect()
}

/// Parse an HTTP date such as `Mon, 02 Jan 2006 15:04:05 GMT`.
///
/// Only the fixed layout is accepted, with a `GMT` or `UTC` zone. Numeric
/// offsets, other zone names and partial forms return `None`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let stamp = value.strip_suffix(" GMT").or_else(|| value.strip_suffix(" UTC"))?;
    NaiveDateTime::parse_from_str(stamp, HTTP_DATE_LAYOUT).ok().map(|dt| dt.and_utc())
}

const HTTP_DATE_LAYOUT: &str = "%a, %d %b %Y %H:%M:%S";

/// Format a timestamp as an IMF-fixdate (`Mon, 02 Jan 2006 15:04:05 GMT`).
pub fn format_http_date(value: DateTime<Utc>) -> String {
    format!("{} GMT", value.format(HTTP_DATE_LAYOUT))
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
