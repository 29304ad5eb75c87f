//! Upstream fetch client.
//!
//! Every network attempt in the strategies goes through this client, which
//! enforces an explicit timeout, a redirect limit, and a response byte cap.
//! Non-2xx statuses are NOT errors here: strategies need the real status to
//! decide whether to cache, and a success-shaped error page still belongs to
//! the caller. Only transport failures (DNS, connect, reset, timeout) map
//! to `Error`.

pub mod url;

use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, Method, StatusCode, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, resolve};

use offcast_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string.
    pub user_agent: String,

    /// Maximum response body size in bytes.
    pub max_bytes: usize,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offcast/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(8000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            max_bytes: cfg.max_bytes,
            timeout: cfg.timeout(),
            max_redirects: cfg.max_redirects,
        }
    }
}

/// Response from an upstream fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code, any value
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// Upstream HTTP client with explicit limits.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// GET a URL, returning raw bytes and metadata.
    pub async fn get(&self, url: &Url) -> Result<FetchResponse, Error> {
        self.send(Method::GET, url, None, None).await
    }

    /// Send a request with an arbitrary method, headers, and body.
    ///
    /// Used for pass-through of non-intercepted requests and for replaying
    /// queued actions. `headers_json` is a JSON string map.
    pub async fn forward(
        &self, method: &str, url: &Url, headers_json: &str, body: Option<Vec<u8>>,
    ) -> Result<FetchResponse, Error> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("bad method: {e}")))?;
        let headers = parse_headers(headers_json);
        self.send(method, url, Some(headers), body).await
    }

    async fn send(
        &self, method: Method, url: &Url, headers: Option<Vec<(String, String)>>, body: Option<Vec<u8>>,
    ) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut request = self.http.request(method, url.as_str());
        if let Some(headers) = headers {
            for (name, value) in headers {
                if is_end_to_end(&name) {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(classify_transport_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} {} in {}ms ({} bytes)",
            url,
            final_url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url: url.clone(), final_url, status, content_type, bytes, headers, fetch_ms })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else {
        Error::Network(err.to_string())
    }
}

/// Hop-by-hop headers and framing headers never forwarded verbatim.
/// content-length is recomputed because bodies are transparently
/// decompressed; host comes from the target URL.
const NOT_FORWARDED: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "host",
];

pub(crate) fn is_end_to_end(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !NOT_FORWARDED.contains(&lower.as_str())
}

fn parse_headers(headers_json: &str) -> Vec<(String, String)> {
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(headers_json) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "offcast/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(8000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { timeout_ms: 1234, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.timeout, Duration::from_millis(1234));
        assert_eq!(config.max_bytes, app.max_bytes);
    }

    #[test]
    fn test_end_to_end_filter() {
        assert!(is_end_to_end("Accept"));
        assert!(is_end_to_end("x-requested-with"));
        assert!(!is_end_to_end("Connection"));
        assert!(!is_end_to_end("transfer-encoding"));
        assert!(!is_end_to_end("Host"));
    }

    #[test]
    fn test_parse_headers_lenient() {
        let headers = parse_headers(r#"{"accept":"application/json","x-num":7}"#);
        assert_eq!(headers, vec![("accept".to_string(), "application/json".to_string())]);

        assert!(parse_headers("not json").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let config = FetchConfig::default();
        let client = FetchClient::new(config);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        // Port 1 is never listening.
        let url = Url::parse("http://127.0.0.1:1/api/v1/videos").unwrap();
        let err = client.get(&url).await.unwrap_err();
        assert!(matches!(err, Error::Network(_) | Error::FetchTimeout(_)));
    }
}
