//! Target selection from invocation arguments.
//!
//! Modes, in precedence order: help, show updaters, only, force/skip options.

use std::collections::BTreeSet;

use clap::{Args, CommandFactory, Parser};
use codeupdater_shared::{CodeUpdaterError, Result};

/// Either every identifier or an explicit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifiers {
    All,
    Set(BTreeSet<String>),
}

impl Default for Identifiers {
    fn default() -> Self {
        Self::Set(BTreeSet::new())
    }
}

impl Identifiers {
    pub fn contains(&self, identifier: &str) -> bool {
        match self {
            Self::All => true,
            Self::Set(set) => set.contains(identifier),
        }
    }

    /// Add one identifier. No-op once the set covers everything.
    pub fn insert(&mut self, identifier: impl Into<String>) {
        if let Self::Set(set) = self {
            set.insert(identifier.into());
        }
    }
}

/// Selection flags, flattened into the binary's own argument parser.
#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Print usage and exit without updating
    #[arg(short = 'h', long = "help")]
    pub help: bool,

    /// Print registered targets (identifier, sources, destination) and exit
    #[arg(short = 'u', long = "show-updaters")]
    pub show_updaters: bool,

    /// Update only this target, forced
    #[arg(long, value_name = "ID")]
    pub only: Option<String>,

    /// Force regeneration of a target regardless of freshness (repeatable)
    #[arg(short = 'f', long = "force", value_name = "ID")]
    pub force: Vec<String>,

    /// Force regeneration of every target
    #[arg(long)]
    pub force_all: bool,

    /// Never regenerate a target this run (repeatable)
    #[arg(short = 's', long = "skip", value_name = "ID")]
    pub skip: Vec<String>,
}

/// Standalone parser for the selection flags alone.
#[derive(Debug, Parser)]
#[command(name = "codeupdater", no_binary_name = true, disable_help_flag = true)]
struct SelectionCommand {
    #[command(flatten)]
    selection: SelectionArgs,
}

/// Usage text of the selection flags.
pub fn usage() -> String {
    SelectionCommand::command().render_help().to_string()
}

/// Resolved selection mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Help,
    ShowUpdaters,
    Only(String),
    Options { force: Identifiers, skip: Identifiers },
}

impl Default for Selection {
    fn default() -> Self {
        Self::Options {
            force: Identifiers::default(),
            skip: Identifiers::default(),
        }
    }
}

impl Selection {
    /// Parse selection flags (without the program name).
    ///
    /// Unknown flags and missing values are argument errors.
    pub fn parse<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let command = SelectionCommand::try_parse_from(args)
            .map_err(|e| CodeUpdaterError::Argument(e.to_string().trim().to_string()))?;
        Self::try_from(command.selection)
    }

    /// Whether `identifier` is forced.
    pub fn forces(&self, identifier: &str) -> bool {
        match self {
            Self::Only(only) => only == identifier,
            Self::Options { force, .. } => force.contains(identifier),
            Self::Help | Self::ShowUpdaters => false,
        }
    }

    /// Whether `identifier` is skipped.
    pub fn skips(&self, identifier: &str) -> bool {
        match self {
            Self::Only(only) => only != identifier,
            Self::Options { skip, .. } => skip.contains(identifier),
            Self::Help | Self::ShowUpdaters => false,
        }
    }
}

impl TryFrom<SelectionArgs> for Selection {
    type Error = CodeUpdaterError;

    fn try_from(args: SelectionArgs) -> Result<Self> {
        let check = |flag: &str, id: &str| {
            if id.trim().is_empty() {
                Err(CodeUpdaterError::Argument(format!("`{flag}` must have a value")))
            } else {
                Ok(())
            }
        };

        if args.help {
            return Ok(Self::Help);
        }
        if args.show_updaters {
            return Ok(Self::ShowUpdaters);
        }
        if let Some(only) = args.only {
            check("--only", &only)?;
            return Ok(Self::Only(only));
        }

        let mut force = if args.force_all {
            Identifiers::All
        } else {
            Identifiers::default()
        };
        for id in args.force {
            check("--force", &id)?;
            force.insert(id);
        }

        let mut skip = Identifiers::default();
        for id in args.skip {
            check("--skip", &id)?;
            skip.insert(id);
        }

        Ok(Self::Options { force, skip })
    }
}
