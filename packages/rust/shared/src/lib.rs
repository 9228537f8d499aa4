//! Shared types, error model, and configuration for codeupdater.
//!
//! This crate is the foundation depended on by all other codeupdater crates.
//! It provides:
//! - [`CodeUpdaterError`]: the unified error type, with [`FormatError`] and
//!   [`FetchError`] sub-taxonomies
//! - Domain types ([`EntityTag`], timestamp helpers, identifier derivation)
//! - Configuration ([`AppConfig`], [`FetchConfig`], manifest loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_CONFIG_FILE, FetchConfig, HttpConfig, OutputConfig, SourceFormat,
    TargetEntry, init_config, load_config, load_config_from,
};
pub use error::{BoxError, CodeUpdaterError, FetchError, FormatError, Result};
pub use types::{
    DEFAULT_COMMENT_MARKER, EntityTag, format_timestamp, identifier_from_path, parse_http_date,
    parse_timestamp,
};
