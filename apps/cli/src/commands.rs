//! CLI definition, tracing setup, and the run loop.

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use color_eyre::eyre::Result;
use codeupdater_core::{
    ProgressReporter, RunSummary, Selection, SelectionArgs, UpdateOutcome, UpdatePhase,
    UpdaterManager,
};
use codeupdater_fetch::FreshnessCache;
use codeupdater_shared::{
    AppConfig, DEFAULT_CONFIG_FILE, FetchConfig, init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::targets;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// codeupdater: regenerate source files when their remote data changes.
#[derive(Parser)]
#[command(
    name = "codeupdater",
    version,
    about = "Regenerate source files from remote data when it changes.",
    long_about = None,
    disable_help_flag = true,
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Manifest path (defaults to ./codeupdater.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write a default manifest and exit.
    #[arg(long)]
    pub init: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "codeupdater=info",
        1 => "codeupdater=debug",
        _ => "codeupdater=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the CLI.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if cli.init {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let written = init_config(&path)?;
        println!("Created {}", written.display());
        return Ok(());
    }

    let selection = Selection::try_from(cli.selection.clone())?;
    if selection == Selection::Help {
        print!("{}", usage());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let mut manager = build_manager(&config, selection);
    let cache = FreshnessCache::with_config(&FetchConfig::from(&config))?;

    let summary = match manager.selection() {
        Selection::ShowUpdaters => manager.run(&cache, &SilentCli).await?,
        _ => {
            let reporter = CliProgress::new();
            let summary = manager.run(&cache, &reporter).await;
            reporter.finish();
            summary?
        }
    };

    print_summary(&summary);
    Ok(())
}

/// Register one updater per manifest target.
fn build_manager(config: &AppConfig, selection: Selection) -> UpdaterManager {
    let mut manager = UpdaterManager::new(selection);
    manager.set_usage(usage());
    targets::register(&mut manager, config);
    info!(targets = manager.len(), "registered targets");
    manager
}

fn usage() -> String {
    Cli::command().render_help().to_string()
}

fn print_summary(summary: &RunSummary) {
    if let Some(text) = &summary.printed {
        print!("{text}");
        return;
    }
    println!();
    println!("  Written:    {}", summary.written);
    println!("  Up to date: {}", summary.up_to_date);
    println!("  Skipped:    {}", summary.skipped);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, identifier: &str, phase: UpdatePhase) {
        self.spinner.set_message(format!("{identifier}: {phase}"));
    }

    fn skipped(&self, identifier: &str) {
        self.spinner.println(format!("  skipped     {identifier}"));
    }

    fn done(&self, identifier: &str, outcome: &UpdateOutcome) {
        let line = match outcome {
            UpdateOutcome::UpToDate => format!("  up to date  {identifier}"),
            UpdateOutcome::Written { path, bytes } => {
                format!("  written     {identifier} → {} ({bytes} bytes)", path.display())
            }
        };
        self.spinner.println(line);
    }
}

/// Reporter for runs that only print.
struct SilentCli;

impl ProgressReporter for SilentCli {
    fn phase(&self, _identifier: &str, _phase: UpdatePhase) {}
    fn skipped(&self, _identifier: &str) {}
    fn done(&self, _identifier: &str, _outcome: &UpdateOutcome) {}
}
