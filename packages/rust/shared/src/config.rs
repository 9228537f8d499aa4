//! Manifest configuration for codeupdater.
//!
//! The manifest lives at `./codeupdater.toml` unless `--config` names another
//! file. It carries HTTP settings, output settings and the list of targets.
//! Relative target destinations resolve against the manifest's directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CodeUpdaterError, Result};
use crate::types::DEFAULT_COMMENT_MARKER;

/// Default manifest file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "codeupdater.toml";

/// Template written by [`init_config`].
const CONFIG_TEMPLATE: &str = r#"# codeupdater manifest

[http]
# user_agent = "codeupdater/0.1.0"
timeout_secs = 30
max_redirects = 5

[output]
comment_marker = "//"

# [[targets]]
# id = "scripts"
# sources = ["https://www.unicode.org/Public/UCD/latest/ucd/Scripts.txt"]
# destination = "src/generated/scripts.rs"
# format = "unicode-data"
# const_name = "SCRIPTS"
"#;

// ---------------------------------------------------------------------------
// Config structs (matching codeupdater.toml schema)
// ---------------------------------------------------------------------------

/// Top-level manifest, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Generated file settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Generation targets.
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("codeupdater/", env!("CARGO_PKG_VERSION")).into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Single-line comment marker of the generated language.
    #[serde(default = "default_comment_marker")]
    pub comment_marker: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            comment_marker: default_comment_marker(),
        }
    }
}

fn default_comment_marker() -> String {
    DEFAULT_COMMENT_MARKER.into()
}

/// How a target's sources are read before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Bytes,
    Text,
    Csv,
    UnicodeData,
}

/// `[[targets]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Identifier; defaults to the destination file stem.
    #[serde(default)]
    pub id: Option<String>,
    /// Source URLs, `http(s)://` or `file://`.
    pub sources: Vec<Url>,
    /// Output file.
    pub destination: PathBuf,
    /// Source representation.
    pub format: SourceFormat,
    /// Name of the generated constant; defaults from the identifier.
    #[serde(default)]
    pub const_name: Option<String>,
    /// Whether CSV sources start with a header row.
    #[serde(default)]
    pub has_header: bool,
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, derived from the manifest)
// ---------------------------------------------------------------------------

/// Runtime HTTP configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects followed per request.
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.http.user_agent.clone(),
            timeout: Duration::from_secs(config.http.timeout_secs),
            max_redirects: config.http.max_redirects,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the manifest from `path`, or from `./codeupdater.toml` when `None`.
///
/// A missing default manifest yields defaults with no targets; a missing
/// explicitly named manifest is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config_from(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if !path.exists() {
                tracing::debug!(?path, "manifest not found, using defaults");
                return Ok(AppConfig::default());
            }
            load_config_from(path)
        }
    }
}

/// Load the manifest from a specific file path.
///
/// Relative target destinations are resolved against the file's directory.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CodeUpdaterError::io(path, e))?;

    let mut config: AppConfig = toml::from_str(&content).map_err(|e| {
        CodeUpdaterError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for target in &mut config.targets {
        if target.destination.is_relative() {
            target.destination = base.join(&target.destination);
        }
    }

    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Reject manifests that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.output.comment_marker.trim().is_empty() {
            return Err(CodeUpdaterError::validation(
                "comment_marker must not be empty",
            ));
        }
        for target in &self.targets {
            if target.sources.is_empty() {
                return Err(CodeUpdaterError::validation(format!(
                    "target for {} has no sources",
                    target.destination.display()
                )));
            }
        }
        Ok(())
    }
}

/// Write a commented default manifest to `path`. Refuses to overwrite.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(CodeUpdaterError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| CodeUpdaterError::io(dir, e))?;
    }
    std::fs::write(path, CONFIG_TEMPLATE).map_err(|e| CodeUpdaterError::io(path, e))?;
    tracing::info!(?path, "created default manifest");

    Ok(path.to_path_buf())
}
