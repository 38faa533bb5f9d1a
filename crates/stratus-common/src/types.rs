//! Domain primitive types used across the stratus workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key of a resource or output inside a rendered template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical id from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity of an [`Annotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message.
    Info,
    /// Something suspicious; fails synthesis in strict mode.
    Warning,
    /// Always fails synthesis.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message attached to a construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Construct path the message belongs to.
    pub path: String,
    /// Severity level.
    pub severity: Severity,
    /// Message text.
    pub message: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.path, self.severity, self.message)
    }
}

/// What happens to a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalPolicy {
    /// Delete the physical resource.
    Destroy,
    /// Keep the physical resource orphaned.
    Retain,
    /// Snapshot, then delete.
    Snapshot,
}

impl RemovalPolicy {
    /// Returns the policy name written into templates.
    #[must_use]
    pub const fn as_template_value(self) -> &'static str {
        match self {
            Self::Destroy => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_id_display() {
        assert_eq!(LogicalId::new("WebLB1234ABCD").to_string(), "WebLB1234ABCD");
    }

    #[test]
    fn severity_ordering_puts_errors_last() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn annotation_display() {
        let note = Annotation {
            path: "Stack/Web".into(),
            severity: Severity::Warning,
            message: "careful".into(),
        };
        assert_eq!(note.to_string(), "[Stack/Web] warning: careful");
    }

    #[test]
    fn removal_policy_template_values() {
        assert_eq!(RemovalPolicy::Destroy.as_template_value(), "Delete");
        assert_eq!(RemovalPolicy::Retain.as_template_value(), "Retain");
        assert_eq!(RemovalPolicy::Snapshot.as_template_value(), "Snapshot");
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).expect("serialize");
        assert_eq!(json, "\"warning\"");
    }
}
