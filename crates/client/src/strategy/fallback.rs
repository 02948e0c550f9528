//! Synthetic responses for when neither the network nor the cache can answer.
//!
//! Every synthetic response carries `x-shelter-offline: 1` so callers can tell
//! it apart from anything the origin produced.

use http::StatusCode;
use http::header::{self, HeaderName, HeaderValue};
use serde_json::json;

use shelter_core::Response;

/// Marker header on synthetic responses.
pub const OFFLINE_HEADER: &str = "x-shelter-offline";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
body { font-family: system-ui, sans-serif; display: flex; min-height: 100vh; align-items: center; justify-content: center; margin: 0; }
main { max-width: 28rem; padding: 2rem; text-align: center; }
</style>
</head>
<body>
<main>
<h1>You're offline</h1>
<p>This page isn't available without a connection. Pages you opened before are still available.</p>
<button onclick="location.reload()">Try again</button>
</main>
</body>
</html>
"#;

/// 503 JSON body for API calls that could not be answered.
pub fn offline_json() -> Response {
    let body = json!({
        "error": "Network unavailable",
        "message": "Please check your internet connection",
        "offline": true,
    });

    Response::new(StatusCode::SERVICE_UNAVAILABLE, body.to_string())
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_header(HeaderName::from_static(OFFLINE_HEADER), HeaderValue::from_static("1"))
}

/// Minimal offline document for navigations. Served as 200 so the browser
/// renders it instead of its own error page.
pub fn offline_html() -> Response {
    Response::new(StatusCode::OK, OFFLINE_PAGE)
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
        .with_header(HeaderName::from_static(OFFLINE_HEADER), HeaderValue::from_static("1"))
}

/// Whether a response was produced here rather than by the origin.
pub fn is_synthetic(response: &Response) -> bool {
    response.headers.contains_key(OFFLINE_HEADER)
}
