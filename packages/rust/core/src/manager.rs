//! Keyed collection of targets and the batch run.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::{info, instrument, warn};

use codeupdater_fetch::FreshnessCache;
use codeupdater_shared::Result;

use crate::pipeline::{CodeUpdater, ProgressReporter, Update, UpdateOutcome, UpdaterDelegate};
use crate::selection::{self, Selection};

/// Counts reported by [`UpdaterManager::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    /// Text printed instead of updating (help or target listing).
    pub printed: Option<String>,
}

/// Owns the targets of one run, keyed by identifier.
pub struct UpdaterManager {
    updaters: HashMap<String, Box<dyn Update>>,
    selection: Selection,
    usage: String,
}

impl Default for UpdaterManager {
    fn default() -> Self {
        Self::new(Selection::default())
    }
}

impl UpdaterManager {
    pub fn new(selection: Selection) -> Self {
        Self {
            updaters: HashMap::new(),
            selection,
            usage: selection::usage(),
        }
    }

    /// Build a manager from selection flags (without the program name).
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::new(Selection::parse(args)?))
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Replace the text printed in help mode.
    pub fn set_usage(&mut self, usage: impl Into<String>) {
        self.usage = usage.into();
    }

    /// Register a target, replacing any target with the same identifier.
    pub fn add(&mut self, updater: Box<dyn Update>) {
        let identifier = updater.identifier();
        if self.updaters.insert(identifier.clone(), updater).is_some() {
            warn!(%identifier, "replaced previously registered target");
        }
    }

    /// Register a delegate with the default pipeline settings.
    pub fn add_delegate<D>(&mut self, delegate: D)
    where
        D: UpdaterDelegate + 'static,
    {
        self.add(Box::new(CodeUpdater::new(delegate)));
    }

    pub fn len(&self) -> usize {
        self.updaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updaters.is_empty()
    }

    /// Targets in run order: identifiers ascending, case-insensitively.
    pub fn updaters(&self) -> Vec<&dyn Update> {
        let mut list: Vec<&dyn Update> = self.updaters.values().map(|u| u.as_ref()).collect();
        list.sort_by(|a, b| compare_identifiers(&a.identifier(), &b.identifier()));
        list
    }

    fn identifiers_in_order(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.updaters.keys().cloned().collect();
        ids.sort_by(|a, b| compare_identifiers(a, b));
        ids
    }

    /// Identifier, sources and destination of every target.
    pub fn targets_info(&self) -> String {
        let mut out = String::new();
        for updater in self.updaters() {
            let _ = writeln!(out, "{}", updater.identifier());
            for url in updater.source_urls() {
                let _ = writeln!(out, "    source: {url}");
            }
            let _ = writeln!(out, "    destination: {}", updater.destination().display());
        }
        out
    }

    /// Run the selected targets in order, stopping at the first failure.
    #[instrument(skip_all, fields(targets = self.updaters.len()))]
    pub async fn run(
        &mut self,
        cache: &FreshnessCache,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        match &self.selection {
            Selection::Help => {
                summary.printed = Some(self.usage.clone());
                return Ok(summary);
            }
            Selection::ShowUpdaters => {
                summary.printed = Some(self.targets_info());
                return Ok(summary);
            }
            Selection::Only(id) if !self.updaters.contains_key(id) => {
                warn!(identifier = %id, "`--only` names no registered target");
            }
            _ => {}
        }

        for identifier in self.identifiers_in_order() {
            if self.selection.skips(&identifier) {
                cache.trace().info(format!("Skip `{identifier}`."));
                progress.skipped(&identifier);
                summary.skipped += 1;
                continue;
            }

            let forced = self.selection.forces(&identifier);
            let Some(updater) = self.updaters.get_mut(&identifier) else {
                continue;
            };
            if forced {
                updater.set_forces_to_update(true);
            }

            match updater.update(cache, progress).await? {
                UpdateOutcome::UpToDate => summary.up_to_date += 1,
                UpdateOutcome::Written { .. } => summary.written += 1,
            }
        }

        info!(
            written = summary.written,
            up_to_date = summary.up_to_date,
            skipped = summary.skipped,
            "run complete"
        );
        Ok(summary)
    }
}

/// Case-insensitive order, with exact comparison breaking ties.
fn compare_identifiers(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
