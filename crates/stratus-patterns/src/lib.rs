//! # stratus-patterns
//!
//! Constructs that users compose into stacks.
//!
//! [`resources`] wraps individual cloud resources (networking, ECS, load
//! balancing, DNS, certificates, roles, log groups) as handles into the
//! construct tree. [`patterns`] builds complete load-balanced ECS services
//! from them, validating option combinations and filling defaults as it goes.
//!
//! # Example
//!
//! ```no_run
//! use stratus_common::config::SynthConfig;
//! use stratus_patterns::patterns::application_load_balanced::{
//!     ApplicationLoadBalancedFargateService, ApplicationLoadBalancedFargateServiceProps,
//! };
//! use stratus_patterns::patterns::{ServiceOptions, TaskImageOptions};
//! use stratus_synth::synth::synthesize;
//! use stratus_synth::tree::{ConstructTree, StackProps};
//!
//! # fn main() -> stratus_common::error::Result<()> {
//! let mut tree = ConstructTree::new();
//! let stack = tree.add_stack("Web", StackProps::default())?;
//! let mut props = ApplicationLoadBalancedFargateServiceProps::default();
//! props.base.service = ServiceOptions {
//!     task_image_options: Some(TaskImageOptions::new("nginx:latest")),
//!     ..ServiceOptions::default()
//! };
//! let _service = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", props)?;
//! let assembly = synthesize(&tree, &SynthConfig::default())?;
//! assembly.write(std::path::Path::new("stratus.out"))?;
//! # Ok(())
//! # }
//! ```

pub mod patterns;
pub mod resources;
