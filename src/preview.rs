//! Link previews: cache first, then the pool.

use std::sync::Arc;

use reqwest::Client;

use crate::cache::{CacheConfig, MemoryCache, ResultCache};
use crate::error::Result;
use crate::fetch::FetchTask;
use crate::link::{HttpConfig, LinkFetcher, LinkMetadata, normalize_url};
use crate::pool::{PoolConfig, PoolSnapshot, TaskPool};

pub type LinkTask = FetchTask<LinkFetcher>;
pub type LinkCache = Arc<dyn ResultCache<String, LinkMetadata>>;

/// Resolves link previews through a shared [`TaskPool`].
#[derive(Clone)]
pub struct LinkPreviewer {
    pool: TaskPool<LinkTask>,
    client: Client,
    http: HttpConfig,
    cache: Option<LinkCache>,
}

impl LinkPreviewer {
    /// Build a previewer with its own pool, client and (if enabled) cache.
    pub fn new(pool: PoolConfig, http: HttpConfig, cache: &CacheConfig) -> Result<Self> {
        let cache: Option<LinkCache> = cache
            .enabled
            .then(|| Arc::new(MemoryCache::<String, LinkMetadata>::from_config(cache)) as LinkCache);
        Self::with_parts(TaskPool::new(pool)?, http, cache)
    }

    pub fn with_parts(pool: TaskPool<LinkTask>, http: HttpConfig, cache: Option<LinkCache>) -> Result<Self> {
        let client = http.build_client()?;
        Ok(Self {
            pool,
            client,
            http,
            cache,
        })
    }

    /// Request metadata for `url`; `on_complete` gets `None` if it cannot be fetched.
    ///
    /// A cached result is delivered immediately without touching the pool.
    pub fn request<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(Option<LinkMetadata>) + Send + 'static,
    {
        let fetcher = LinkFetcher::new(self.client.clone(), url)?;
        let key = fetcher.url().to_string();

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
            tracing::debug!(url = %key, "Cache hit");
            on_complete(Some(hit));
            return Ok(());
        }

        let task = FetchTask::new(fetcher).with_timeout(self.http.timeout());
        let cache = self.cache.clone();
        self.pool.submit(task, move |result| {
            if let (Some(cache), Some(metadata)) = (cache, result.as_ref()) {
                cache.put(key, metadata.clone());
            }
            on_complete(result);
        })
    }

    /// Request metadata for `url` and wait for it.
    pub async fn preview(&self, url: &str) -> Result<Option<LinkMetadata>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.request(url, move |result| {
            let _ = reply.send(result);
        })?;
        Ok(rx.await.ok().flatten())
    }

    /// Drop any pending request for `url`.
    pub fn cancel(&self, url: &str) -> Result<()> {
        let key = normalize_url(url)?.to_string();
        self.pool.cancel(key)
    }

    pub async fn snapshot(&self) -> Result<PoolSnapshot<String>> {
        self.pool.snapshot().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }

    pub fn cache(&self) -> Option<&LinkCache> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::error::LinkpoolError;

    fn metadata(url: &str) -> LinkMetadata {
        LinkMetadata {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            content_length: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_pool() {
        let previewer = LinkPreviewer::new(PoolConfig::default(), HttpConfig::default(), &CacheConfig::default()).unwrap();
        let url = "https://example.invalid/cached";
        previewer
            .cache()
            .unwrap()
            .put(url.to_string(), metadata(url));

        let result = previewer.preview("https://example.invalid/cached#frag").await.unwrap();

        assert_eq!(result.map(|m| m.status), Some(200));
        let snapshot = previewer.snapshot().await.unwrap();
        assert_eq!(snapshot.stats.submitted, 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let previewer = LinkPreviewer::new(PoolConfig::default(), HttpConfig::default(), &CacheConfig::default()).unwrap();
        assert!(matches!(
            previewer.request("mailto:someone@example.com", |_| {}),
            Err(LinkpoolError::InvalidUrl(_))
        ));
        assert!(previewer.cancel("::").is_err());
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let previewer = LinkPreviewer::new(PoolConfig::default(), HttpConfig::default(), &config).unwrap();
        assert!(previewer.cache().is_none());
    }
}
