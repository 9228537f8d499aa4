//! Error types for codeupdater.
//!
//! Library crates use [`CodeUpdaterError`] via `thiserror`.
//! The cli app wraps this with `color-eyre` for the single top-level report.
//!
//! Only metadata [`FormatError`]s are recoverable: a malformed or missing header
//! in a previously generated file simply means "regenerate". Everything else
//! stops the batch.

use std::path::PathBuf;

/// Boxed error returned by pluggable convert steps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all codeupdater operations.
#[derive(Debug, thiserror::Error)]
pub enum CodeUpdaterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Invocation arguments could not be parsed.
    #[error("argument error: {0}")]
    Argument(String),

    /// The metadata header of a generated file is malformed.
    #[error("metadata format error: {0}")]
    Format(#[from] FormatError),

    /// Fetching a source failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Source content is not valid UTF-8.
    #[error("content at {url} cannot be converted to a string")]
    CannotConvertToString { url: String },

    /// A source representation adapter rejected the fetched content.
    #[error("cannot read source {url}: {message}")]
    Source { url: String, message: String },

    /// The convert step of a target failed.
    #[error("conversion failed for `{identifier}`: {source}")]
    ConversionFailed {
        identifier: String,
        source: BoxError,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The manifest parsed but describes an unusable run.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CodeUpdaterError>;

impl CodeUpdaterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a source error for `url`.
    pub fn unreadable_source(url: impl ToString, msg: impl Into<String>) -> Self {
        Self::Source {
            url: url.to_string(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the pipeline may treat this error as "needs regeneration".
    ///
    /// True for metadata format errors and for a destination file that does
    /// not exist yet.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Format(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Errors raised while parsing a metadata header.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unexpected line at #{line}")]
    UnexpectedLine { line: usize },

    #[error("#{line} is not a comment line")]
    NotCommentLine { line: usize },

    #[error("#{line} must be a key-value pair")]
    NotKeyValuePair { line: usize },

    #[error("invalid URL at #{line}")]
    InvalidUrl { line: usize },

    #[error("invalid date at #{line}")]
    InvalidDate { line: usize },

    #[error("some URL must be declared before #{line}")]
    InfoBeforeUrl { line: usize },

    #[error("duplicated entry at #{line}")]
    DuplicatedInfo { line: usize },

    #[error("invalid ETag at #{line}")]
    InvalidEtag { line: usize },

    #[error("no data was found")]
    NoData,
}

impl FormatError {
    /// Line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::UnexpectedLine { line }
            | Self::NotCommentLine { line }
            | Self::NotKeyValuePair { line }
            | Self::InvalidUrl { line }
            | Self::InvalidDate { line }
            | Self::InfoBeforeUrl { line }
            | Self::DuplicatedInfo { line }
            | Self::InvalidEtag { line } => Some(*line),
            Self::NoData => None,
        }
    }
}

/// Errors raised while fetching a source or its validators.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unexpected status code {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("no content at {url}")]
    NoContent { url: String },

    #[error("no ETag is available for {url}")]
    NoEtag { url: String },

    #[error("no Last-Modified date is available for {url}")]
    NoLastModified { url: String },

    #[error("{url}: {message}")]
    Transport { url: String, message: String },
}
