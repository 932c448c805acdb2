//! Link metadata fetching
//!
//! [`LinkFetcher`] is the concrete [`Fetch`] behind link previews. It issues a
//! GET and records what the response headers say about the target. The body is
//! never read.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Url, redirect};
use serde::{Deserialize, Serialize};

use crate::error::{LinkpoolError, Result};
use crate::fetch::Fetch;

/// Default request timeout
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default redirect limit
const DEFAULT_MAX_REDIRECTS: usize = 5;

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the shared HTTP client
    pub fn build_client(&self) -> Result<Client> {
        let client = Client::builder()
            .timeout(self.timeout())
            .user_agent(self.user_agent.as_str())
            .redirect(redirect::Policy::limited(self.max_redirects))
            .build()?;
        Ok(client)
    }
}

/// What a link resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    /// Normalized requested URL
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

/// Parse and normalize a URL into the key used for dedup and caching.
///
/// Fragments are dropped since they never reach the server.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| LinkpoolError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(LinkpoolError::InvalidUrl(format!("{raw}: unsupported scheme {other}")));
        }
    }
    url.set_fragment(None);
    Ok(url)
}

/// Fetches metadata for one URL
#[derive(Debug, Clone)]
pub struct LinkFetcher {
    client: Client,
    url: Url,
}

impl LinkFetcher {
    pub fn new(client: Client, raw_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            url: normalize_url(raw_url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Fetch for LinkFetcher {
    type Key = String;
    type Output = LinkMetadata;

    fn key(&self) -> String {
        self.url.to_string()
    }

    fn label(&self) -> String {
        format!("link {}", self.url)
    }

    async fn fetch(&self) -> Result<LinkMetadata> {
        tracing::debug!(url = %self.url, "Fetching link metadata");

        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LinkpoolError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(LinkMetadata {
            url: self.url.to_string(),
            final_url: response.url().to_string(),
            status: status.as_u16(),
            content_type,
            content_length,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.max_redirects, 5);
        assert!(config.user_agent.starts_with("linkpool/"));
    }

    #[test]
    fn test_normalize_url_drops_fragment() {
        let url = normalize_url("https://Example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_normalize_url_adds_root_path() {
        let url = normalize_url("  http://example.com ").unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert!(matches!(normalize_url("not a url"), Err(LinkpoolError::InvalidUrl(_))));
    }

    #[test]
    fn test_normalize_url_rejects_other_schemes() {
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(LinkpoolError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_link_fetcher_key_is_normalized() {
        let client = HttpConfig::default().build_client().unwrap();
        let a = LinkFetcher::new(client.clone(), "https://example.com/a#top").unwrap();
        let b = LinkFetcher::new(client, "https://EXAMPLE.com/a").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.label(), "link https://example.com/a");
    }
}
