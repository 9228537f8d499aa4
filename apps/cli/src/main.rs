//! codeupdater CLI: regenerate source files from remote data.
//!
//! Reads the targets of a `codeupdater.toml` manifest, checks each source's
//! Last-Modified/ETag against the header of the previously generated file and
//! regenerates only what changed.

mod commands;
mod targets;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
