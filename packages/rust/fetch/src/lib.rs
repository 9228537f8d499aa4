//! Source fetching and the per-run freshness cache.
//!
//! This crate provides:
//! - [`Fetcher`]: GET/HEAD over HTTP(S) and reads of `file://` sources
//! - [`FreshnessCache`]: memoized responses, Last-Modified dates and ETags,
//!   answering "has this source changed since a known state?"
//! - [`Trace`]: the indentation-scoped progress trace shared by a run

pub mod cache;
pub mod client;
pub mod trace;

pub use cache::FreshnessCache;
pub use client::{FetchedResponse, Fetcher, HeadInfo, local_path};
pub use trace::Trace;
