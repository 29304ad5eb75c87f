//! Request/response types crossing the worker boundary, plus the
//! synthesized fallback bodies.
//!
//! The fallbacks uphold the degradation contract: API callers always get
//! parseable JSON, navigations always get renderable HTML, static assets
//! get bytes or an empty 404.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::Serialize;
use url::Url;

use crate::classify::RequestMode;
use crate::fetch::{FetchResponse, is_end_to_end};
use offcast_core::CacheEntry;
use offcast_core::cache::hash::entry_key;

/// An intercepted request as seen by the worker.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    /// Original request headers as a JSON string map.
    pub headers_json: String,
    pub body: Option<Bytes>,
}

impl WorkerRequest {
    /// A plain GET sub-resource request, the common case.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::Subresource,
            headers_json: "{}".to_string(),
            body: None,
        }
    }

    /// A top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
    }

    /// Cache key identifying this request.
    pub fn cache_key(&self) -> String {
        entry_key(&self.method, self.url.as_str())
    }
}

/// Where a response came from, carried to the gateway for the
/// `x-offcast-source` response header and to tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
    Fallback,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::Network => "network",
            ServedFrom::Cache => "cache",
            ServedFrom::Fallback => "fallback",
        }
    }
}

/// What the worker hands back for an intercepted request.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub served_from: ServedFrom,
}

/// The JSON envelope synthesized when an API request fails offline with no
/// cached copy. Success-shaped so dependent frontend code parses it instead
/// of throwing.
#[derive(Debug, Serialize)]
struct OfflineEnvelope {
    success: bool,
    message: &'static str,
    data: Vec<serde_json::Value>,
    offline: bool,
}

const OFFLINE_MESSAGE: &str = "Offline mode - content may not be up to date";

const OFFLINE_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
</head>
<body>
<h1>You are offline</h1>
<p>This page is not available right now. Check your connection and try again.</p>
<button onclick="location.reload()">Retry</button>
</body>
</html>
"#;

impl WorkerResponse {
    /// Build from a live upstream response, dropping hop-by-hop headers.
    pub fn from_fetch(resp: FetchResponse) -> Self {
        Self {
            status: resp.status.as_u16(),
            headers: end_to_end_headers(&resp.headers),
            body: resp.bytes,
            served_from: ServedFrom::Network,
        }
    }

    /// Build from a stored cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: headers_from_json(&entry.headers_json),
            body: Bytes::from(entry.body.clone()),
            served_from: ServedFrom::Cache,
        }
    }

    /// Offline placeholder for API requests: empty-but-valid JSON.
    pub fn offline_api() -> Self {
        let envelope = OfflineEnvelope { success: false, message: OFFLINE_MESSAGE, data: Vec::new(), offline: true };
        let body = serde_json::to_vec(&envelope).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body),
            served_from: ServedFrom::Fallback,
        }
    }

    /// Self-contained offline page for navigations with an empty cache.
    pub fn offline_page() -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html; charset=utf-8".to_string())],
            body: Bytes::from_static(OFFLINE_PAGE_HTML.as_bytes()),
            served_from: ServedFrom::Fallback,
        }
    }

    /// Empty 404 for static assets that are neither cached nor reachable.
    pub fn not_found() -> Self {
        Self { status: 404, headers: Vec::new(), body: Bytes::new(), served_from: ServedFrom::Fallback }
    }

    /// Upstream unreachable on a non-intercepted request.
    pub fn bad_gateway(message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status: 502,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body),
            served_from: ServedFrom::Fallback,
        }
    }

    /// First content-type header value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Serialize end-to-end response headers into the JSON map stored with a
/// cache entry.
pub fn headers_to_json(headers: &HeaderMap) -> String {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter(|(name, _)| is_end_to_end(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), serde_json::Value::String(v.to_string())))
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}

/// Parse a stored header map. Lenient: garbage yields no headers.
pub fn headers_from_json(headers_json: &str) -> Vec<(String, String)> {
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(headers_json) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn end_to_end_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| is_end_to_end(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
