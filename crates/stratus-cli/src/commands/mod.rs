//! CLI command definitions and dispatch.

pub mod plan;
pub mod synth;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stratus_common::config::SynthConfig;
use stratus_common::constants::{ENV_ACCOUNT, ENV_OUTPUT_DIR, ENV_REGION, ENV_STRICT};

/// Stratus: synthesize load-balanced container services into deployable templates.
#[derive(Parser, Debug)]
#[command(name = "stratus", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory the cloud assembly is written to.
    #[arg(long, short, global = true, env = ENV_OUTPUT_DIR)]
    pub output: Option<PathBuf>,

    /// Treat warnings as errors.
    #[arg(long, global = true, env = ENV_STRICT)]
    pub strict: bool,

    /// Default region of stacks that declare none.
    #[arg(long, global = true, env = ENV_REGION)]
    pub region: Option<String>,

    /// Default account of stacks that declare none.
    #[arg(long, global = true, env = ENV_ACCOUNT)]
    pub account: Option<String>,
}

impl Cli {
    /// Synthesis configuration from the environment and the global flags.
    #[must_use]
    pub fn synth_config(&self) -> SynthConfig {
        let strict = self.strict.then(|| "true".to_string());
        SynthConfig::from_env().overlay(|key| match key {
            ENV_OUTPUT_DIR => self.output.as_ref().map(|p| p.display().to_string()),
            ENV_REGION => self.region.clone(),
            ENV_ACCOUNT => self.account.clone(),
            ENV_STRICT => strict.clone(),
            _ => None,
        })
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize the manifest and write the cloud assembly.
    Synth(synth::SynthArgs),
    /// Show each stack's resources in deployment order.
    Plan(plan::PlanArgs),
    /// Build the construct tree and run validation only.
    Validate(validate::ValidateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.synth_config();
    tracing::debug!(?config, "resolved configuration");
    match cli.command {
        Command::Synth(args) => synth::execute(&args, &config),
        Command::Plan(args) => plan::execute(&args, &config),
        Command::Validate(args) => validate::execute(&args, &config),
    }
}
