//! Stored responses and their capture timestamp.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::message::Response;

/// Header stamped on every stored entry with its RFC 3339 capture time.
pub const CACHED_AT_HEADER: &str = "sw-cached-at";

/// A response as kept in a partition.
///
/// Only ever replaced wholesale; there is no partial update.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StoredEntry {
    /// Capture a response now.
    pub fn capture(response: &Response) -> Self {
        Self::capture_at(response, Utc::now())
    }

    /// Capture a response, stamping `captured_at` as its capture time.
    pub fn capture_at(response: &Response, captured_at: DateTime<Utc>) -> Self {
        let mut headers = response.headers.clone();
        let stamp = captured_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&stamp) {
            headers.insert(HeaderName::from_static(CACHED_AT_HEADER), value);
        }
        Self { status: response.status, headers, body: response.body.clone() }
    }

    /// When the entry was captured.
    ///
    /// Falls back to the origin's `date` header for entries written by
    /// something other than this worker.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        if let Some(value) = self.headers.get(CACHED_AT_HEADER) {
            return value
                .to_str()
                .ok()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));
        }

        self.headers
            .get(header::DATE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn to_response(&self) -> Response {
        Response { status: self.status, headers: self.headers.clone(), body: self.body.clone() }
    }

    pub fn into_response(self) -> Response {
        Response { status: self.status, headers: self.headers, body: self.body }
    }
}

/// Serialize headers as a JSON list of name/value pairs, values hex-encoded
/// so opaque (non-UTF-8) bytes survive.
pub(crate) fn headers_to_json(headers: &HeaderMap) -> String {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), hex::encode(value.as_bytes())))
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Parse headers written by [`headers_to_json`]. Pairs that no longer parse
/// are dropped.
pub(crate) fn headers_from_json(json: &str) -> HeaderMap {
    let pairs: Vec<(String, String)> = serde_json::from_str(json).unwrap_or_default();
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let value = hex::decode(&value).ok().and_then(|bytes| HeaderValue::from_bytes(&bytes).ok());
        match (HeaderName::from_bytes(name.as_bytes()), value) {
            (Ok(name), Some(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping unparsable stored header"),
        }
    }
    headers
}
