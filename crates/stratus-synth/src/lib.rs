//! # stratus-synth
//!
//! The construct tree and the synthesis engine that turns it into templates.
//!
//! Handles:
//! - **Tree**: Arena of constructs (stacks, scopes, resources, outputs, fragments).
//! - **Token**: Deferred values and their string stand-ins.
//! - **Lexer**: Splitting strings into literal and token fragments.
//! - **Resolver**: Rendering deferred values and recording the references they imply.
//! - **Logical id**: Stable template keys derived from construct paths.
//! - **Graph**: Dependency ordering and cycle detection.
//! - **Validator**: Synthesis-time validation of the whole tree.
//! - **Template / Synth**: Template model, cloud assembly, and the synthesis driver.

pub mod graph;
pub mod lexer;
pub mod logical_id;
pub mod resolver;
pub mod synth;
pub mod template;
pub mod token;
pub mod tree;
pub mod validator;
