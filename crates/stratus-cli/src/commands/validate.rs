//! `stratus validate`: Build the construct tree and run validation only.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stratus_common::config::SynthConfig;
use stratus_common::constants::DEFAULT_MANIFEST_FILE;
use stratus_common::types::Severity;

use crate::{manifest, output};

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the app manifest.
    #[arg(default_value = DEFAULT_MANIFEST_FILE)]
    pub manifest: PathBuf,
}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be built, a validator fails,
/// or strict mode is on and warnings were recorded.
pub fn execute(args: &ValidateArgs, config: &SynthConfig) -> anyhow::Result<()> {
    let app = manifest::load(&args.manifest)?;
    let tree = manifest::build(&app, config)?;
    stratus_synth::validator::validate(&tree).context("validation failed")?;

    let warnings: Vec<_> = tree
        .annotations()
        .into_iter()
        .filter(|note| note.severity == Severity::Warning)
        .collect();
    for note in &warnings {
        println!("{}", output::annotation_line(note));
    }
    if config.strict && !warnings.is_empty() {
        anyhow::bail!("{} in strict mode", output::plural(warnings.len(), "warning"));
    }

    println!(
        "{} is valid ({}, {})",
        args.manifest.display(),
        output::plural(tree.stacks().len(), "stack"),
        output::plural(warnings.len(), "warning")
    );
    Ok(())
}
