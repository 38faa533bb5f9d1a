//! `stratus plan`: Display each stack's resources in deployment order.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use stratus_common::config::SynthConfig;
use stratus_common::constants::DEFAULT_MANIFEST_FILE;
use stratus_synth::synth::{CloudAssembly, StackArtifact};

use crate::{manifest, output};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the app manifest.
    #[arg(default_value = DEFAULT_MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Machine-readable plan of one stack.
#[derive(Debug, Serialize)]
struct StackPlan<'a> {
    name: &'a str,
    environment: String,
    dependencies: &'a [String],
    resources: Vec<ResourcePlan<'a>>,
}

#[derive(Debug, Serialize)]
struct ResourcePlan<'a> {
    logical_id: &'a str,
    #[serde(rename = "type")]
    resource_type: &'a str,
    depends_on: &'a [String],
}

fn stack_plan(stack: &StackArtifact) -> StackPlan<'_> {
    let resources = stack
        .deployment_order
        .iter()
        .filter_map(|id| {
            stack.template.resources.get(id).map(|entry| ResourcePlan {
                logical_id: id,
                resource_type: &entry.resource_type,
                depends_on: &entry.depends_on,
            })
        })
        .collect();
    StackPlan {
        name: &stack.name,
        environment: stack.environment.uri(),
        dependencies: &stack.dependencies,
        resources,
    }
}

/// Executes the `plan` command.
///
/// Synthesizes in memory without writing anything and prints the stacks
/// in deployment order, each with its resources in deployment order.
///
/// # Errors
///
/// Returns an error if loading, construction or synthesis fails.
pub fn execute(args: &PlanArgs, config: &SynthConfig) -> anyhow::Result<()> {
    let app = manifest::load(&args.manifest)?;
    let tree = manifest::build(&app, config)?;
    let assembly = stratus_synth::synth::synthesize(&tree, config).context("synthesis failed")?;

    if args.json {
        println!("{}", render_json(&assembly)?);
        return Ok(());
    }

    let title = format!("Deployment Plan for: {}", args.manifest.display());
    println!("{title}");
    println!("{}", output::rule(title.chars().count()));
    for stack in &assembly.stacks {
        let plan = stack_plan(stack);
        println!();
        println!("  {} ({})", plan.name, plan.environment);
        if !plan.dependencies.is_empty() {
            println!("    after: {}", plan.dependencies.join(", "));
        }
        for resource in &plan.resources {
            println!("    + {:<48} {}", resource.logical_id, resource.resource_type);
            if !resource.depends_on.is_empty() {
                println!("        depends on: {}", resource.depends_on.join(", "));
            }
        }
    }

    let total: usize = assembly.stacks.iter().map(|s| s.template.resources.len()).sum();
    println!();
    println!(
        "  {} in {} will be deployed.",
        output::plural(total, "resource"),
        output::plural(assembly.stacks.len(), "stack")
    );
    let warnings: Vec<_> = assembly.warnings().collect();
    if !warnings.is_empty() {
        println!();
        for note in warnings {
            println!("{}", output::annotation_line(note));
        }
    }
    Ok(())
}

fn render_json(assembly: &CloudAssembly) -> anyhow::Result<String> {
    let stacks: Vec<StackPlan<'_>> = assembly.stacks.iter().map(stack_plan).collect();
    Ok(serde_json::to_string_pretty(&stacks)?)
}
