//! Per-run freshness cache.
//!
//! Memoizes, per source URL, the full response of a successful GET, the
//! Last-Modified date and the ETag. A memoized "no value" is a valid answer and
//! prevents repeated lookups. Entries are immutable once populated; each table
//! sits behind its own lock so per-URL work can run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codeupdater_shared::{
    CodeUpdaterError, EntityTag, FetchConfig, FetchError, Result, parse_http_date,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use crate::client::{FetchedResponse, Fetcher, file_modified, local_path};
use crate::trace::Trace;

/// Memoized responses and validators for one process run.
#[derive(Debug)]
pub struct FreshnessCache {
    fetcher: Fetcher,
    responses: Mutex<HashMap<Url, Arc<FetchedResponse>>>,
    last_modified: Mutex<HashMap<Url, Option<DateTime<Utc>>>>,
    etags: Mutex<HashMap<Url, Option<EntityTag>>>,
    trace: Trace,
}

impl FreshnessCache {
    /// Create an empty cache using `fetcher` for misses.
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            responses: Mutex::new(HashMap::new()),
            last_modified: Mutex::new(HashMap::new()),
            etags: Mutex::new(HashMap::new()),
            trace: Trace::new(),
        }
    }

    /// Create an empty cache with a fetcher built from `config`.
    pub fn with_config(config: &FetchConfig) -> Result<Self> {
        Ok(Self::new(Fetcher::new(config)?))
    }

    /// The progress trace shared by this run.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Content of `url`, fetched at most once per run.
    pub async fn fetch_content(&self, url: &Url) -> Result<Vec<u8>> {
        Ok(self.response(url).await?.body.clone())
    }

    /// Full response of `url`, fetched at most once per run.
    pub async fn response(&self, url: &Url) -> Result<Arc<FetchedResponse>> {
        if let Some(cached) = self.cached_response(url).await {
            return Ok(cached);
        }

        let fetched = self
            .trace
            .step(format!("Fetching {url}"), self.fetcher.get(url))
            .await?;

        let mut responses = self.responses.lock().await;
        let entry = responses
            .entry(url.clone())
            .or_insert_with(|| Arc::new(fetched));
        Ok(Arc::clone(entry))
    }

    async fn cached_response(&self, url: &Url) -> Option<Arc<FetchedResponse>> {
        self.responses.lock().await.get(url).cloned()
    }

    /// Last-Modified date of `url`.
    ///
    /// Taken from a cached response if there is one, else from the file's
    /// modification time for local sources, else from a HEAD request.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn last_modified(&self, url: &Url) -> Result<Option<DateTime<Utc>>> {
        if let Some(known) = self.last_modified.lock().await.get(url) {
            return Ok(*known);
        }

        let value = self
            .trace
            .step(format!("Looking up Last-Modified of {url}"), async {
                if let Some(response) = self.cached_response(url).await {
                    return Ok::<_, CodeUpdaterError>(
                        response.last_modified().and_then(parse_http_date),
                    );
                }
                if let Some(path) = local_path(url) {
                    return file_modified(&path).await.map(Some);
                }
                let head = self.fetcher.head(url).await?;
                Ok(head.last_modified.as_deref().and_then(parse_http_date))
            })
            .await?;

        debug!(?value, "memoized Last-Modified");
        let mut table = self.last_modified.lock().await;
        Ok(*table.entry(url.clone()).or_insert(value))
    }

    /// ETag of `url`, using the same lookup order as [`Self::last_modified`].
    ///
    /// Local sources never have an ETag.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn etag(&self, url: &Url) -> Result<Option<EntityTag>> {
        if let Some(known) = self.etags.lock().await.get(url) {
            return Ok(known.clone());
        }

        let value = self
            .trace
            .step(format!("Looking up ETag of {url}"), async {
                if let Some(response) = self.cached_response(url).await {
                    let tag: Option<EntityTag> = response.etag().and_then(|v| v.parse().ok());
                    return Ok::<_, CodeUpdaterError>(tag);
                }
                if local_path(url).is_some() {
                    return Ok(None);
                }
                let head = self.fetcher.head(url).await?;
                Ok(head.etag.as_deref().and_then(|v| v.parse().ok()))
            })
            .await?;

        debug!(?value, "memoized ETag");
        let mut table = self.etags.lock().await;
        Ok(table.entry(url.clone()).or_insert(value).clone())
    }

    /// Whether `url` changed after `date`. Fails if no date is available.
    pub async fn is_modified_since(&self, url: &Url, date: DateTime<Utc>) -> Result<bool> {
        let current = self
            .last_modified(url)
            .await?
            .ok_or_else(|| FetchError::NoLastModified {
                url: url.to_string(),
            })?;

        let modified = current > date;
        if !modified {
            self.trace.info(format!("{url} is up to date"));
        }
        Ok(modified)
    }

    /// Whether the current ETag of `url` weakly matches `known`.
    /// Fails if the source has no ETag.
    pub async fn matches_etag(&self, url: &Url, known: &EntityTag) -> Result<bool> {
        let current = self
            .etag(url)
            .await?
            .ok_or_else(|| FetchError::NoEtag {
                url: url.to_string(),
            })?;

        let matches = current.weak_eq(known);
        if matches {
            self.trace.info(format!("{url} is up to date"));
        }
        Ok(matches)
    }
}
