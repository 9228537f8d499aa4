//! Update pipeline and orchestration for codeupdater.
//!
//! This crate ties the freshness cache, the metadata store and the source
//! adapters together:
//! - [`CodeUpdater`]: the per-target pipeline (freshness → prepare → convert → write)
//! - [`UpdaterManager`]: the keyed collection of targets and the batch run
//! - [`Selection`]: force/skip/only selection parsed from invocation arguments

pub mod manager;
pub mod pipeline;
pub mod selection;

pub use manager::{RunSummary, UpdaterManager};
pub use pipeline::{
    CodeUpdater, IntermediateData, ProgressReporter, SilentProgress, Update, UpdateOutcome,
    UpdatePhase, UpdaterDelegate,
};
pub use selection::{Identifiers, Selection, SelectionArgs};
