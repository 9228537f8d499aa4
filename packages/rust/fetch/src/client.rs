//! HTTP and local-file transport.
//!
//! `http`/`https` sources go through a shared `reqwest` client; `file` sources
//! are read from disk and given a synthesized `Last-Modified` header built from
//! the file's modification time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use codeupdater_shared::{CodeUpdaterError, FetchConfig, FetchError, Result};
use reqwest::Client;
use reqwest::header::{ETAG, HeaderMap, HeaderValue, LAST_MODIFIED};
use tracing::debug;
use url::Url;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A successful full response, as kept by the freshness cache.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// HTTP status code (200 for local files).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Raw `Last-Modified` header value.
    pub fn last_modified(&self) -> Option<&str> {
        header_str(&self.headers, LAST_MODIFIED.as_str())
    }

    /// Raw `ETag` header value.
    pub fn etag(&self) -> Option<&str> {
        header_str(&self.headers, ETAG.as_str())
    }
}

/// Metadata from a HEAD request.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    /// HTTP status code returned by the server.
    pub status: u16,
    /// Raw `ETag` header value.
    pub etag: Option<String>,
    /// Raw `Last-Modified` header value.
    pub last_modified: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Transport for source URLs.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CodeUpdaterError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Full GET of `url`. Fails on non-2xx status and on an empty HTTP body.
    pub async fn get(&self, url: &Url) -> Result<FetchedResponse> {
        if let Some(path) = local_path(url) {
            return read_local(url, &path).await;
        }
        ensure_http(url)?;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;
        if body.is_empty() {
            return Err(FetchError::NoContent {
                url: url.to_string(),
            }
            .into());
        }

        debug!(%url, bytes = body.len(), status = status.as_u16(), "fetched");
        Ok(FetchedResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }

    /// HEAD request for validators, without downloading content.
    pub async fn head(&self, url: &Url) -> Result<HeadInfo> {
        ensure_http(url)?;

        let response = self
            .client
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let headers = response.headers();
        Ok(HeadInfo {
            status: status.as_u16(),
            etag: header_str(headers, ETAG.as_str()).map(str::to_string),
            last_modified: header_str(headers, LAST_MODIFIED.as_str()).map(str::to_string),
        })
    }
}

/// Filesystem path of a `file://` URL.
pub fn local_path(url: &Url) -> Option<PathBuf> {
    if url.scheme() == "file" {
        url.to_file_path().ok()
    } else {
        None
    }
}

/// Modification time of a local file, truncated to whole seconds.
pub async fn file_modified(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| CodeUpdaterError::io(path, e))?;
    let modified = metadata
        .modified()
        .map_err(|e| CodeUpdaterError::io(path, e))?;
    Ok(DateTime::<Utc>::from(modified).trunc_subsecs(0))
}

async fn read_local(url: &Url, path: &Path) -> Result<FetchedResponse> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| CodeUpdaterError::io(path, e))?;
    let modified = file_modified(path).await?;

    let mut headers = HeaderMap::new();
    let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    if let Ok(value) = HeaderValue::from_str(&http_date) {
        headers.insert(LAST_MODIFIED, value);
    }

    debug!(%url, bytes = body.len(), "read local source");
    Ok(FetchedResponse {
        status: 200,
        headers,
        body,
    })
}

fn ensure_http(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(FetchError::Transport {
            url: url.to_string(),
            message: format!("unsupported scheme `{scheme}`"),
        }
        .into()),
    }
}

fn transport_error(url: &Url, e: reqwest::Error) -> CodeUpdaterError {
    FetchError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeupdater_shared::parse_http_date;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn get_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("hello")
                    .insert_header("etag", "\"v1\"")
                    .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/data.txt", server.uri())).unwrap();
        let response = fetcher().get(&url).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
        assert_eq!(response.etag(), Some("\"v1\""));
        assert_eq!(
            response.last_modified(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/broken", server.uri())).unwrap();
        let err = fetcher().get(&url).await.unwrap_err();
        assert!(matches!(
            err,
            CodeUpdaterError::Fetch(FetchError::UnexpectedStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn empty_body_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/empty", server.uri())).unwrap();
        let err = fetcher().get(&url).await.unwrap_err();
        assert!(matches!(
            err,
            CodeUpdaterError::Fetch(FetchError::NoContent { .. })
        ));
    }

    #[tokio::test]
    async fn head_reads_validators() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.txt"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "W/\"abc\""))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/data.txt", server.uri())).unwrap();
        let head = fetcher().head(&url).await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.etag.as_deref(), Some("W/\"abc\""));
        assert!(head.last_modified.is_none());
    }

    #[tokio::test]
    async fn local_files_get_a_last_modified_header() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("source.txt");
        std::fs::write(&file, "local").unwrap();

        let url = Url::from_file_path(&file).unwrap();
        assert_eq!(local_path(&url), Some(file.clone()));

        let response = fetcher().get(&url).await.unwrap();
        assert_eq!(response.body, b"local");

        let header = response.last_modified().unwrap();
        let expected = file_modified(&file).await.unwrap();
        assert_eq!(parse_http_date(header), Some(expected));
    }

    #[tokio::test]
    async fn unsupported_schemes_are_rejected() {
        let url = Url::parse("ftp://example.com/data.txt").unwrap();
        assert!(fetcher().get(&url).await.is_err());
        assert!(fetcher().head(&url).await.is_err());
    }
}
