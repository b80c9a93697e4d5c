//! Page retrieval for the scrape-once engine.
//!
//! ### Fetchers
//! - [`HttpPageFetcher`]: plain HTTP GET, HTML parsed for title and visible text.
//! - `HeadlessPageFetcher` (`render` feature): headless Chromium, for pages
//!   that only produce text after running scripts.
//!
//! ### Safety Gates
//! - Only `http`/`https` URLs
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod error;
pub mod text;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};

use pagewise_core::AppConfig;

pub use error::FetchError;
pub use text::{FetchedPage, extract_page};

/// Retrieves the title and text of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pagewise/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 60s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "pagewise/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(60_000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP page fetcher with byte and redirect limits.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpPageFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();
        let url = parse_http_url(url)?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus { status: status.as_u16() });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(FetchError::TooLarge { size: len, limit: self.config.max_bytes });
        }

        let is_html = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));

        let bytes = response.bytes().await?;
        if bytes.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge { size: bytes.len() as u64, limit: self.config.max_bytes });
        }

        let body = String::from_utf8_lossy(&bytes);
        let page = if is_html { extract_page(&body) } else { FetchedPage::new("", body.trim()) };

        tracing::debug!(
            "fetched {} in {}ms ({} bytes, {} chars of text)",
            url,
            start.elapsed().as_millis(),
            bytes.len(),
            page.text.len()
        );

        Ok(page)
    }
}

pub(crate) fn parse_http_url(input: &str) -> Result<url::Url, FetchError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl("empty URL".into()));
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| FetchError::InvalidUrl(format!("{trimmed}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_bytes: usize) -> HttpPageFetcher {
        HttpPageFetcher::new(FetchConfig { max_bytes, timeout: Duration::from_secs(5), ..Default::default() }).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "pagewise/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "ua/1".into(), max_bytes: 1024, timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from_app_config(&app);
        assert_eq!(config.user_agent, "ua/1");
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://example.com/a").is_ok());
        assert!(matches!(parse_http_url(""), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_http_url("ftp://example.com"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_http_url("not a url"), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><head><title>Wind Update</title></head><body><p>80 turbines</p></body></html>",
                    "text/html; charset=utf-8",
                ),
            )
            .mount(&server)
            .await;

        let page = fetcher(1024).fetch_page(&format!("{}/article", server.uri())).await.unwrap();
        assert_eq!(page.title, "Wind Update");
        assert_eq!(page.text, "80 turbines");
    }

    #[tokio::test]
    async fn test_fetch_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(" raw ", "text/plain"))
            .mount(&server)
            .await;

        let page = fetcher(1024).fetch_page(&server.uri()).await.unwrap();
        assert_eq!(page, FetchedPage::new("", "raw"));
    }

    #[tokio::test]
    async fn test_fetch_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let err = fetcher(1024).fetch_page(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let err = fetcher(1024).fetch_page(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
    }
}
