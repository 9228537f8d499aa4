//! Target metadata store.
//!
//! Every generated file begins with a comment block recording, per source URL,
//! the Last-Modified date and/or ETag the source had when the file was written.
//! This crate parses that block back into a [`TargetMetadata`] and renders it.

pub mod header;

pub use header::{FreshnessRecord, TargetMetadata, split_header};
