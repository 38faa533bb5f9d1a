//! Unified error types for the stratus workspace.
//!
//! Construction-time failures surface immediately as [`StratusError::Validation`];
//! problems found while synthesizing are aggregated into
//! [`StratusError::ValidationFailed`] so that a single run reports all of them.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StratusError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required construct or resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing item.
        kind: &'static str,
        /// Identifier of the missing item.
        id: String,
    },

    /// A construct id is malformed.
    #[error("invalid construct id \"{id}\": {reason}")]
    InvalidId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A sibling with the same id already exists.
    #[error("there is already a construct with id \"{id}\" in {parent}")]
    DuplicateConstruct {
        /// Path of the parent scope.
        parent: String,
        /// The conflicting id.
        id: String,
    },

    /// Construction of a construct was rejected.
    #[error("[{path}] {message}")]
    Validation {
        /// Path of the construct being built.
        path: String,
        /// Human readable reason.
        message: String,
    },

    /// Synthesis-time validation produced one or more errors.
    #[error("validation failed with {} error(s):\n  {}", .errors.len(), .errors.join("\n  "))]
    ValidationFailed {
        /// Messages, each prefixed with the construct path.
        errors: Vec<String>,
    },

    /// A token string referenced a token that was never registered.
    #[error("unresolved token: {token}")]
    UnresolvedToken {
        /// The offending token marker or fragment.
        token: String,
    },

    /// Lazy values or token strings kept producing further deferred values.
    #[error("deferred value did not resolve within {limit} expansions")]
    ResolutionDepthExceeded {
        /// Maximum number of nested expansions.
        limit: usize,
    },

    /// A value references a resource in another stack.
    #[error("stack \"{from_stack}\" cannot reference {target} in stack \"{to_stack}\"")]
    CrossStackReference {
        /// Stack being rendered.
        from_stack: String,
        /// Stack owning the referenced resource.
        to_stack: String,
        /// Path of the referenced resource.
        target: String,
    },

    /// The resource or stack dependency graph contains a cycle.
    #[error("cyclic dependency detected between: {}", .members.join(", "))]
    CyclicDependency {
        /// Members of the cycle.
        members: Vec<String>,
    },

    /// Two resources of one stack resolved to the same logical id.
    #[error("duplicate logical id \"{logical_id}\" in stack \"{stack}\"")]
    DuplicateLogicalId {
        /// Stack name.
        stack: String,
        /// Colliding logical id.
        logical_id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl StratusError {
    /// Shorthand for a construction-time [`StratusError::Validation`].
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StratusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_prefixes_path() {
        let err = StratusError::validation("Stack/Service", "boom");
        assert_eq!(err.to_string(), "[Stack/Service] boom");
    }

    #[test]
    fn validation_failed_lists_every_error() {
        let err = StratusError::ValidationFailed {
            errors: vec!["[A] one".into(), "[B] two".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("validation failed with 2 error(s)"), "got: {msg}");
        assert!(msg.contains("[A] one"));
        assert!(msg.contains("[B] two"));
    }

    #[test]
    fn cyclic_dependency_names_members() {
        let err = StratusError::CyclicDependency {
            members: vec!["Alpha".into(), "Beta".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency detected between: Alpha, Beta"
        );
    }
}
