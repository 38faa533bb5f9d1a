//! # stratus: infrastructure synthesis CLI
//!
//! Reads a YAML app manifest, builds the construct tree, and synthesizes
//! deployable templates plus an assembly manifest.

mod commands;
mod manifest;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
