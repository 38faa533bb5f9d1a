//! IAM roles.

use stratus_common::error::Result;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::add_construct;

/// Service principal assumed by ECS tasks.
pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// A role assumable by a service principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::IAM::Role` resource.
    pub resource: NodeId,
}

impl Role {
    /// Creates a role trusted by `service_principal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already taken.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        service_principal: &str,
    ) -> Result<Self> {
        let statement = Value::object([
            ("Action", Value::from("sts:AssumeRole")),
            ("Effect", "Allow".into()),
            ("Principal", Value::object([("Service", Value::from(service_principal))])),
        ]);
        let policy = Value::object([
            ("Version", Value::from("2012-10-17")),
            ("Statement", Value::List(vec![statement])),
        ]);
        let resource =
            Resource::new("AWS::IAM::Role").with_property("AssumeRolePolicyDocument", policy);
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        Ok(Self { node, resource })
    }

    /// Role ARN.
    #[must_use]
    pub fn arn(&self) -> Value {
        Value::get_att(self.resource, "Arn")
    }
}

#[cfg(test)]
mod tests {
    use stratus_synth::tree::StackProps;

    use super::*;

    #[test]
    fn trust_policy_names_the_principal() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let role = Role::new(&mut tree, stack, "TaskRole", ECS_TASKS_PRINCIPAL).expect("role");
        let doc = tree
            .resource(role.resource)
            .and_then(|r| r.property("AssumeRolePolicyDocument"))
            .expect("policy");
        let principal = doc
            .get("Statement")
            .and_then(Value::as_list)
            .and_then(|s| s.first())
            .and_then(|s| s.get("Principal"))
            .and_then(|p| p.get("Service"))
            .and_then(Value::as_str);
        assert_eq!(principal, Some(ECS_TASKS_PRINCIPAL));
    }
}
