//! HTTP producer for cached fetches

use crate::error::{CliError, Result};
use blob_cache::CacheEntry;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Response headers carried into the cache entry alongside the body
const KEPT_HEADERS: [header::HeaderName; 3] =
    [header::ETAG, header::LAST_MODIFIED, header::CACHE_CONTROL];

/// HTTP client that turns a URL into a cache entry
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Fetch `url`, keeping its content type and validator headers
    pub async fn fetch(&self, url: &str) -> Result<CacheEntry> {
        debug!(url = %url, "Fetching");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Fetch failed");
            return Err(CliError::Upstream(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let kept: Vec<(String, String)> = KEPT_HEADERS
            .iter()
            .filter_map(|name| {
                let value = response.headers().get(name)?.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response.bytes().await?.to_vec();

        debug!(
            size = body.len(),
            content_type = %content_type,
            "Fetched"
        );

        let entry = kept
            .into_iter()
            .fold(CacheEntry::new(body, content_type), |entry, (name, value)| {
                entry.with_header(name, value)
            });
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("not a url").await;
        assert!(matches!(result, Err(CliError::Http(_))));
    }
}
