//! CloudWatch log groups.

use stratus_common::error::Result;
use stratus_common::types::RemovalPolicy;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::add_construct;

/// Options for [`LogGroup::new`].
#[derive(Debug, Clone, Copy)]
pub struct LogGroupProps {
    /// Retention in days. `None` keeps events forever.
    pub retention_days: Option<u32>,
    /// What happens to the group when it leaves the template.
    pub removal_policy: RemovalPolicy,
}

impl Default for LogGroupProps {
    fn default() -> Self {
        Self {
            retention_days: None,
            removal_policy: RemovalPolicy::Retain,
        }
    }
}

/// A log group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogGroup {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::Logs::LogGroup` resource.
    pub resource: NodeId,
}

impl LogGroup {
    /// Creates a log group.
    ///
    /// # Errors
    ///
    /// Returns an error if the retention is zero or the id is taken.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: LogGroupProps,
    ) -> Result<Self> {
        let resource = Resource::new("AWS::Logs::LogGroup")
            .with_property("RetentionInDays", props.retention_days)
            .with_removal_policy(props.removal_policy);
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        if props.retention_days == Some(0) {
            return Err(tree.error(node, "log retention must be at least one day"));
        }
        Ok(Self { node, resource })
    }

    /// Log group name.
    #[must_use]
    pub const fn log_group_name(&self) -> Value {
        Value::Ref(self.resource)
    }
}
