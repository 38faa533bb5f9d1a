//! `stratus synth`: Render every stack and write the cloud assembly.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stratus_common::config::SynthConfig;
use stratus_common::constants::DEFAULT_MANIFEST_FILE;

use crate::{manifest, output};

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Path to the app manifest.
    #[arg(default_value = DEFAULT_MANIFEST_FILE)]
    pub manifest: PathBuf,
}

/// Executes the `synth` command.
///
/// Loads the manifest, builds the construct tree, synthesizes it and
/// writes one template per stack plus the assembly manifest into the
/// configured output directory.
///
/// # Errors
///
/// Returns an error if loading, construction, synthesis or writing fails.
pub fn execute(args: &SynthArgs, config: &SynthConfig) -> anyhow::Result<()> {
    let app = manifest::load(&args.manifest)?;
    let tree = manifest::build(&app, config)?;
    let assembly = stratus_synth::synth::synthesize(&tree, config).context("synthesis failed")?;
    assembly
        .write(&config.output_dir)
        .with_context(|| format!("failed to write assembly to {}", config.output_dir.display()))?;

    println!("Synthesized {}", output::plural(assembly.stacks.len(), "stack"));
    for stack in &assembly.stacks {
        println!(
            "  {:<24} {:<14} {}",
            stack.name,
            output::plural(stack.template.resources.len(), "resource"),
            stack.template_file()
        );
    }
    let warnings: Vec<_> = assembly.warnings().collect();
    if !warnings.is_empty() {
        println!();
        for note in warnings {
            println!("{}", output::annotation_line(note));
        }
    }
    println!();
    println!("Cloud assembly written to {}", config.output_dir.display());
    Ok(())
}
