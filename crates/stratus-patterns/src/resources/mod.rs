//! Resource constructs.
//!
//! Every construct here is a small handle of [`NodeId`]s into a
//! [`ConstructTree`]. A construct owns a scope node; its primary template
//! resource is the child named `Resource`, so the logical id is derived from
//! the construct id alone.

pub mod acm;
pub mod ec2;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod route53;

use stratus_common::error::{Result, StratusError};
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

/// Id of the primary resource below a construct scope.
pub const PRIMARY_RESOURCE_ID: &str = "Resource";

/// Adds a construct scope with its primary resource.
///
/// Returns `(scope, resource)`.
pub(crate) fn add_construct(
    tree: &mut ConstructTree,
    parent: NodeId,
    id: &str,
    resource: Resource,
) -> Result<(NodeId, NodeId)> {
    let node = tree.add_scope(parent, id)?;
    let primary = tree.add_resource(node, PRIMARY_RESOURCE_ID, resource)?;
    Ok((node, primary))
}

/// Returns the primary resource of a construct scope.
pub(crate) fn primary_resource(tree: &ConstructTree, node: NodeId) -> Result<NodeId> {
    tree.find_child(node, PRIMARY_RESOURCE_ID)
        .filter(|&child| tree.resource(child).is_some())
        .ok_or_else(|| StratusError::NotFound {
            kind: "resource",
            id: format!("{}/{PRIMARY_RESOURCE_ID}", tree.path(node)),
        })
}

/// Sets a property on a resource node.
pub(crate) fn set_property(
    tree: &mut ConstructTree,
    resource: NodeId,
    key: &str,
    value: impl Into<Value>,
) -> Result<()> {
    let path = tree.path(resource);
    tree.resource_mut(resource)
        .ok_or(StratusError::NotFound { kind: "resource", id: path })?
        .set_property(key, value);
    Ok(())
}

/// Appends `item` to a list property, creating the list when absent.
pub(crate) fn push_property(
    tree: &mut ConstructTree,
    resource: NodeId,
    key: &str,
    item: Value,
) -> Result<()> {
    let path = tree.path(resource);
    let res = tree
        .resource_mut(resource)
        .ok_or(StratusError::NotFound { kind: "resource", id: path })?;
    match res.properties.get_mut(key).and_then(Value::as_list_mut) {
        Some(items) => items.push(item),
        None => res.set_property(key, Value::List(vec![item])),
    }
    Ok(())
}

/// Returns a mutable fragment value.
pub(crate) fn fragment_mut(tree: &mut ConstructTree, node: NodeId) -> Result<&mut Value> {
    let path = tree.path(node);
    tree.fragment_mut(node)
        .ok_or(StratusError::NotFound { kind: "fragment", id: path })
}

#[cfg(test)]
mod tests {
    use stratus_synth::tree::StackProps;

    use super::*;

    #[test]
    fn push_property_creates_then_appends() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let (node, res) =
            add_construct(&mut tree, stack, "Group", Resource::new("AWS::EC2::SecurityGroup"))
                .expect("construct");
        push_property(&mut tree, res, "Rules", "a".into()).expect("push");
        push_property(&mut tree, res, "Rules", "b".into()).expect("push");

        let rules = tree
            .resource(res)
            .and_then(|r| r.property("Rules"))
            .and_then(Value::as_list)
            .expect("rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(primary_resource(&tree, node).expect("primary"), res);
    }

    #[test]
    fn primary_resource_requires_a_resource_child() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let scope = tree.add_scope(stack, "Empty").expect("scope");
        assert!(primary_resource(&tree, scope).is_err());
    }
}
