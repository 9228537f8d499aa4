//! Per-target update pipeline.
//!
//! One run of [`CodeUpdater::update`] walks
//! `DecideFreshness → (UpToDate | Prepare → Convert → Write)`. Unreadable or
//! missing metadata means "regenerate"; every other failure propagates.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use url::Url;

use codeupdater_fetch::FreshnessCache;
use codeupdater_metadata::{FreshnessRecord, TargetMetadata};
use codeupdater_shared::{
    BoxError, CodeUpdaterError, DEFAULT_COMMENT_MARKER, Result, identifier_from_path,
};
use codeupdater_sources::FromSource;

// ---------------------------------------------------------------------------
// Intermediate data
// ---------------------------------------------------------------------------

/// One source's content after adaptation, ready for conversion.
#[derive(Debug, Clone)]
pub struct IntermediateData<T> {
    /// Adapted content.
    pub content: T,
    /// Source the content came from. Always set by the pipeline.
    pub source_url: Url,
    /// Free-form annotations attached by the delegate's `prepare`.
    pub user_info: Option<HashMap<String, serde_json::Value>>,
}

impl<T> IntermediateData<T> {
    pub fn new(source_url: Url, content: T) -> Self {
        Self {
            content,
            source_url,
            user_info: None,
        }
    }

    /// Attach an annotation.
    pub fn with_user_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.user_info
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Look up an annotation.
    pub fn user_info(&self, key: &str) -> Option<&serde_json::Value> {
        self.user_info.as_ref()?.get(key)
    }
}

// ---------------------------------------------------------------------------
// Delegate
// ---------------------------------------------------------------------------

/// What a target generates and how.
pub trait UpdaterDelegate: Send + Sync {
    /// Representation each source is read into before conversion.
    type Intermediate: FromSource + Send;

    /// Unique identifier; the destination's file stem unless overridden.
    fn identifier(&self) -> String {
        identifier_from_path(&self.destination())
    }

    /// Sources, in the order they are handed to `convert`.
    fn source_urls(&self) -> Vec<Url>;

    /// Generated file.
    fn destination(&self) -> PathBuf;

    /// Adapt fetched content. Override for a domain-specific loader or to
    /// attach `user_info`.
    fn prepare(&self, url: &Url, content: Vec<u8>) -> Result<IntermediateData<Self::Intermediate>> {
        let content = Self::Intermediate::from_source(url, content)?;
        Ok(IntermediateData::new(url.clone(), content))
    }

    /// Produce the generated file body (without the metadata header).
    fn convert(
        &self,
        data: Vec<IntermediateData<Self::Intermediate>>,
    ) -> std::result::Result<Vec<u8>, BoxError>;
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Pipeline phase, reported to a [`ProgressReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    DecideFreshness,
    Prepare,
    Convert,
    Write,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DecideFreshness => "Checking freshness",
            Self::Prepare => "Fetching sources",
            Self::Convert => "Converting",
            Self::Write => "Writing",
        };
        f.write_str(name)
    }
}

/// Result of one target's update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Every source matched the recorded state; nothing was written.
    UpToDate,
    /// The destination was regenerated.
    Written { path: PathBuf, bytes: usize },
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a target enters a new phase.
    fn phase(&self, identifier: &str, phase: UpdatePhase);
    /// Called when a target is skipped by selection.
    fn skipped(&self, identifier: &str);
    /// Called when a target finishes.
    fn done(&self, identifier: &str, outcome: &UpdateOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _identifier: &str, _phase: UpdatePhase) {}
    fn skipped(&self, _identifier: &str) {}
    fn done(&self, _identifier: &str, _outcome: &UpdateOutcome) {}
}

// ---------------------------------------------------------------------------
// Update (object-safe view of a target)
// ---------------------------------------------------------------------------

/// A registered target, independent of its intermediate representation.
#[async_trait]
pub trait Update: Send + Sync {
    fn identifier(&self) -> String;
    fn source_urls(&self) -> Vec<Url>;
    fn destination(&self) -> PathBuf;
    fn forces_to_update(&self) -> bool;
    fn set_forces_to_update(&mut self, force: bool);

    /// Run the pipeline once.
    async fn update(
        &mut self,
        cache: &FreshnessCache,
        progress: &dyn ProgressReporter,
    ) -> Result<UpdateOutcome>;
}

// ---------------------------------------------------------------------------
// CodeUpdater
// ---------------------------------------------------------------------------

/// The pipeline for one target.
#[derive(Debug)]
pub struct CodeUpdater<D> {
    delegate: D,
    forces_to_update: bool,
    comment_marker: String,
}

impl<D: UpdaterDelegate> CodeUpdater<D> {
    pub fn new(delegate: D) -> Self {
        Self {
            delegate,
            forces_to_update: false,
            comment_marker: DEFAULT_COMMENT_MARKER.to_string(),
        }
    }

    /// Use `marker` as the single-line comment marker of the generated file.
    pub fn with_comment_marker(mut self, marker: impl Into<String>) -> Self {
        self.comment_marker = marker.into();
        self
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn comment_marker(&self) -> &str {
        &self.comment_marker
    }

    /// Whether the destination reflects the current state of every source.
    ///
    /// Always false when forced. A missing or malformed header counts as stale.
    pub async fn is_up_to_date(&self, cache: &FreshnessCache) -> Result<bool> {
        if self.forces_to_update {
            return Ok(false);
        }

        let destination = self.delegate.destination();
        let metadata = match TargetMetadata::from_path(&destination, &self.comment_marker) {
            Ok(metadata) => metadata,
            Err(e) if e.is_recoverable() => {
                debug!(path = %destination.display(), error = %e, "no usable metadata");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        for url in self.delegate.source_urls() {
            if !source_is_fresh(cache, &metadata, &url).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    #[instrument(skip_all, fields(identifier = %identifier))]
    async fn run(
        &self,
        identifier: &str,
        cache: &FreshnessCache,
        progress: &dyn ProgressReporter,
    ) -> Result<UpdateOutcome> {
        progress.phase(identifier, UpdatePhase::DecideFreshness);
        if self.is_up_to_date(cache).await? {
            cache.trace().info(format!("`{identifier}` is up to date"));
            return Ok(UpdateOutcome::UpToDate);
        }

        progress.phase(identifier, UpdatePhase::Prepare);
        let urls = self.delegate.source_urls();
        let mut prepared = Vec::with_capacity(urls.len());
        for url in &urls {
            let content = cache.fetch_content(url).await?;
            let mut data = self.delegate.prepare(url, content)?;
            data.source_url = url.clone();
            prepared.push(data);
        }

        progress.phase(identifier, UpdatePhase::Convert);
        let body = cache
            .trace()
            .step(
                format!("Converting data for `{identifier}`"),
                async {
                    self.delegate
                        .convert(prepared)
                        .map_err(|source| CodeUpdaterError::ConversionFailed {
                            identifier: identifier.to_string(),
                            source,
                        })
                },
            )
            .await?;

        progress.phase(identifier, UpdatePhase::Write);
        let path = self.write(cache, &urls, &body).await?;
        info!(path = %path.display(), bytes = body.len(), "wrote generated file");
        Ok(UpdateOutcome::Written {
            path,
            bytes: body.len(),
        })
    }

    /// Write the fresh header followed by `body`, replacing any existing file.
    async fn write(&self, cache: &FreshnessCache, urls: &[Url], body: &[u8]) -> Result<PathBuf> {
        let mut metadata = TargetMetadata::new();
        for url in urls {
            let record = FreshnessRecord {
                last_modified: cache.last_modified(url).await?,
                etag: cache.etag(url).await?,
            };
            metadata.insert(url.clone(), record);
        }

        let destination = self.delegate.destination();
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CodeUpdaterError::io(parent, e))?;
        }

        let mut out = metadata.render(&self.comment_marker).into_bytes();
        out.extend_from_slice(body);

        cache
            .trace()
            .step(format!("Writing {}", destination.display()), async {
                tokio::fs::write(&destination, &out)
                    .await
                    .map_err(|e| CodeUpdaterError::io(&destination, e))
            })
            .await?;
        Ok(destination)
    }
}

async fn source_is_fresh(
    cache: &FreshnessCache,
    metadata: &TargetMetadata,
    url: &Url,
) -> Result<bool> {
    let Some(record) = metadata.record(url) else {
        debug!(%url, "source not recorded");
        return Ok(false);
    };

    if let Some(etag) = &record.etag {
        cache.matches_etag(url, etag).await
    } else if let Some(date) = record.last_modified {
        Ok(!cache.is_modified_since(url, date).await?)
    } else {
        Ok(false)
    }
}

#[async_trait]
impl<D: UpdaterDelegate> Update for CodeUpdater<D> {
    fn identifier(&self) -> String {
        self.delegate.identifier()
    }

    fn source_urls(&self) -> Vec<Url> {
        self.delegate.source_urls()
    }

    fn destination(&self) -> PathBuf {
        self.delegate.destination()
    }

    fn forces_to_update(&self) -> bool {
        self.forces_to_update
    }

    fn set_forces_to_update(&mut self, force: bool) {
        self.forces_to_update = force;
    }

    async fn update(
        &mut self,
        cache: &FreshnessCache,
        progress: &dyn ProgressReporter,
    ) -> Result<UpdateOutcome> {
        let identifier = self.delegate.identifier();
        let outcome = cache
            .trace()
            .step(
                format!("Start updating `{identifier}`"),
                self.run(&identifier, cache, progress),
            )
            .await?;
        progress.done(&identifier, &outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeupdater_metadata::split_header;
    use codeupdater_shared::{EntityTag, FetchConfig};
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedOutput {
        sources: Vec<Url>,
        destination: PathBuf,
        output: Vec<u8>,
    }

    impl UpdaterDelegate for FixedOutput {
        type Intermediate = Vec<u8>;

        fn source_urls(&self) -> Vec<Url> {
            self.sources.clone()
        }

        fn destination(&self) -> PathBuf {
            self.destination.clone()
        }

        fn convert(
            &self,
            _data: Vec<IntermediateData<Vec<u8>>>,
        ) -> std::result::Result<Vec<u8>, BoxError> {
            Ok(self.output.clone())
        }
    }

    struct Concatenate {
        sources: Vec<Url>,
        destination: PathBuf,
    }

    impl UpdaterDelegate for Concatenate {
        type Intermediate = String;

        fn identifier(&self) -> String {
            "concat".into()
        }

        fn source_urls(&self) -> Vec<Url> {
            self.sources.clone()
        }

        fn destination(&self) -> PathBuf {
            self.destination.clone()
        }

        fn prepare(&self, url: &Url, content: Vec<u8>) -> Result<IntermediateData<String>> {
            let text = String::from_source(url, content)?;
            let lines = text.lines().count();
            Ok(IntermediateData::new(url.clone(), text)
                .with_user_info("lines", serde_json::json!(lines)))
        }

        fn convert(
            &self,
            data: Vec<IntermediateData<String>>,
        ) -> std::result::Result<Vec<u8>, BoxError> {
            let mut out = String::new();
            for item in data {
                let lines = item.user_info("lines").and_then(|v| v.as_u64()).unwrap_or(0);
                out.push_str(&format!("{} ({lines}): {}\n", item.source_url, item.content.trim()));
            }
            Ok(out.into_bytes())
        }
    }

    struct Failing {
        sources: Vec<Url>,
        destination: PathBuf,
    }

    impl UpdaterDelegate for Failing {
        type Intermediate = Vec<u8>;

        fn source_urls(&self) -> Vec<Url> {
            self.sources.clone()
        }

        fn destination(&self) -> PathBuf {
            self.destination.clone()
        }

        fn convert(
            &self,
            _data: Vec<IntermediateData<Vec<u8>>>,
        ) -> std::result::Result<Vec<u8>, BoxError> {
            Err("unsupported layout".into())
        }
    }

    fn cache() -> FreshnessCache {
        FreshnessCache::with_config(&FetchConfig::default()).unwrap()
    }

    fn local_source(dir: &Path, name: &str, content: &str) -> Url {
        let file = dir.join(name);
        std::fs::write(&file, content).unwrap();
        Url::from_file_path(file).unwrap()
    }

    fn body_of(path: &Path) -> String {
        let content = std::fs::read_to_string(path).unwrap();
        split_header(&content, "//").1.to_string()
    }

    #[test]
    fn identifier_defaults_to_file_stem() {
        let delegate = FixedOutput {
            sources: vec![],
            destination: PathBuf::from("/out/Scripts.rs"),
            output: vec![],
        };
        assert_eq!(delegate.identifier(), "Scripts");
    }

    #[tokio::test]
    async fn forced_update_writes_exact_body() {
        let dir = tempfile::tempdir().unwrap();
        let source = local_source(dir.path(), "input.txt", "anything");
        let destination = dir.path().join("gen").join("output.rs");

        let mut updater = CodeUpdater::new(FixedOutput {
            sources: vec![source.clone()],
            destination: destination.clone(),
            output: b"pub const X: u8 = 1;\n".to_vec(),
        });
        updater.set_forces_to_update(true);

        let outcome = updater.update(&cache(), &SilentProgress).await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Written {
                path: destination.clone(),
                bytes: 21
            }
        );
        assert_eq!(body_of(&destination), "pub const X: u8 = 1;\n");

        let metadata = TargetMetadata::from_path(&destination, "//").unwrap();
        assert!(metadata.contains_info(&source));
        assert!(metadata.last_modified_date(&source).is_some());
        assert!(metadata.etag(&source).is_none());
    }

    #[tokio::test]
    async fn local_source_is_up_to_date_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = local_source(dir.path(), "input.txt", "v1");
        let destination = dir.path().join("output.rs");
        let delegate = || FixedOutput {
            sources: vec![source.clone()],
            destination: destination.clone(),
            output: b"generated\n".to_vec(),
        };

        let mut first = CodeUpdater::new(delegate());
        let outcome = first.update(&cache(), &SilentProgress).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Written { .. }));

        let mut second = CodeUpdater::new(delegate());
        let outcome = second.update(&cache(), &SilentProgress).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::UpToDate);
    }

    #[tokio::test]
    async fn weak_stored_etag_matches_strong_current_etag() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.txt"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"x\""))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("new"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = Url::parse(&format!("{}/data.txt", server.uri())).unwrap();
        let destination = dir.path().join("data.rs");
        let existing = format!("// URL: {source}\n// ETAG: W/\"x\"\n\nold body\n");
        std::fs::write(&destination, &existing).unwrap();

        let mut updater = CodeUpdater::new(FixedOutput {
            sources: vec![source],
            destination: destination.clone(),
            output: b"new body\n".to_vec(),
        });
        let outcome = updater.update(&cache(), &SilentProgress).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::UpToDate);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), existing);
    }

    #[tokio::test]
    async fn changed_etag_regenerates_and_records_new_validators() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.txt"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"y\""))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("fresh")
                    .insert_header("etag", "\"y\"")
                    .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = Url::parse(&format!("{}/data.txt", server.uri())).unwrap();
        let destination = dir.path().join("data.rs");
        std::fs::write(&destination, format!("// URL: {source}\n// ETAG: \"x\"\n\nold\n")).unwrap();

        let mut updater = CodeUpdater::new(FixedOutput {
            sources: vec![source.clone()],
            destination: destination.clone(),
            output: b"new\n".to_vec(),
        });
        let outcome = updater.update(&cache(), &SilentProgress).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Written { .. }));

        let metadata = TargetMetadata::from_path(&destination, "//").unwrap();
        assert_eq!(metadata.etag(&source), EntityTag::strong("y").as_ref());
        assert!(metadata.last_modified_date(&source).is_some());
        assert_eq!(body_of(&destination), "new\n");
    }

    #[tokio::test]
    async fn malformed_or_incomplete_headers_mean_regenerate() {
        let dir = tempfile::tempdir().unwrap();
        let source = local_source(dir.path(), "input.txt", "v1");
        let destination = dir.path().join("output.rs");
        let updater = CodeUpdater::new(FixedOutput {
            sources: vec![source.clone()],
            destination: destination.clone(),
            output: vec![],
        });
        let cache = cache();

        // Missing file.
        assert!(!updater.is_up_to_date(&cache).await.unwrap());

        // Not a header at all.
        std::fs::write(&destination, "fn main() {}\n").unwrap();
        assert!(!updater.is_up_to_date(&cache).await.unwrap());

        // Header for a different source.
        std::fs::write(&destination, "// URL: https://example.com/other\n\n").unwrap();
        assert!(!updater.is_up_to_date(&cache).await.unwrap());

        // Source recorded without validators.
        std::fs::write(&destination, format!("// URL: {source}\n\n")).unwrap();
        assert!(!updater.is_up_to_date(&cache).await.unwrap());
    }

    #[tokio::test]
    async fn custom_marker_and_user_info_flow_through() {
        let dir = tempfile::tempdir().unwrap();
        let first = local_source(dir.path(), "a.txt", "one\ntwo\n");
        let second = local_source(dir.path(), "b.txt", "three\n");
        let destination = dir.path().join("out.py");

        let mut updater = CodeUpdater::new(Concatenate {
            sources: vec![first.clone(), second.clone()],
            destination: destination.clone(),
        })
        .with_comment_marker("#");
        updater.update(&cache(), &SilentProgress).await.unwrap();

        let content = std::fs::read_to_string(&destination).unwrap();
        let (header, body) = split_header(&content, "#");
        let metadata = TargetMetadata::parse_str(header, "#").unwrap();
        assert_eq!(metadata.urls().collect::<Vec<_>>(), vec![&first, &second]);
        assert_eq!(
            body,
            format!("{first} (2): one\ntwo\n{second} (1): three\n")
        );
    }

    #[tokio::test]
    async fn convert_failure_is_conversion_failed() {
        let dir = tempfile::tempdir().unwrap();
        let source = local_source(dir.path(), "input.txt", "v1");
        let destination = dir.path().join("broken.rs");

        let mut updater = CodeUpdater::new(Failing {
            sources: vec![source],
            destination: destination.clone(),
        });
        let err = updater.update(&cache(), &SilentProgress).await.unwrap_err();

        match err {
            CodeUpdaterError::ConversionFailed { identifier, source } => {
                assert_eq!(identifier, "broken");
                assert_eq!(source.to_string(), "unsupported layout");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut updater = CodeUpdater::new(FixedOutput {
            sources: vec![Url::parse(&format!("{}/down", server.uri())).unwrap()],
            destination: dir.path().join("down.rs"),
            output: vec![],
        });
        updater.set_forces_to_update(true);

        let err = updater.update(&cache(), &SilentProgress).await.unwrap_err();
        assert!(!err.is_recoverable());
    }
}
