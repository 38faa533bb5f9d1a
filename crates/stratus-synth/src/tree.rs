//! The construct tree.
//!
//! Constructs live in an arena owned by [`ConstructTree`] and are addressed
//! by copyable [`NodeId`]s. The root is the app; its children are stacks;
//! everything else nests below a stack. Nodes carry the data the synthesis
//! engine needs: resource definitions, outputs, lazily rendered fragments,
//! explicit dependencies, annotations, and late validators.

use std::collections::BTreeMap;
use std::fmt;

use stratus_common::config::Environment;
use stratus_common::constants::{TOKEN_MARKER_END, TOKEN_MARKER_START};
use stratus_common::error::{Result, StratusError};
use stratus_common::types::{Annotation, RemovalPolicy, Severity};

use crate::token::Value;

/// Handle to a node of a [`ConstructTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Late validation hook, run during synthesis.
pub type Validator = Box<dyn Fn(&ConstructTree, NodeId) -> Vec<String> + Send + Sync>;

/// Options for [`ConstructTree::add_stack`].
#[derive(Debug, Clone, Default)]
pub struct StackProps {
    /// Deployed stack name. Defaults to the construct id.
    pub stack_name: Option<String>,
    /// Target environment. Defaults to the tree's default environment.
    pub environment: Option<Environment>,
    /// Template description.
    pub description: Option<String>,
}

/// Resolved settings of a stack node.
#[derive(Debug, Clone)]
pub struct StackInfo {
    /// Deployed stack name.
    pub name: String,
    /// Target environment.
    pub environment: Environment,
    /// Template description.
    pub description: Option<String>,
}

/// A resource definition rendered into a template.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Provider type name, e.g. `AWS::ECS::Service`.
    pub resource_type: String,
    /// Property values, rendered in key order.
    pub properties: BTreeMap<String, Value>,
    /// Deletion behaviour.
    pub removal_policy: Option<RemovalPolicy>,
}

impl Resource {
    /// Creates a resource with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            removal_policy: None,
        }
    }

    /// Sets a property, builder style. Null values are not stored.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Sets the removal policy, builder style.
    #[must_use]
    pub const fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    /// Sets or clears a property. A null value removes the key.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if value.is_null() {
            let _ = self.properties.remove(&key);
        } else {
            let _ = self.properties.insert(key, value);
        }
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A stack output.
#[derive(Debug, Clone)]
pub struct Output {
    /// Exported value.
    pub value: Value,
    /// Human readable description.
    pub description: Option<String>,
    /// Export name for cross-stack consumption.
    pub export_name: Option<String>,
}

impl Output {
    /// Creates an output for `value`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
            export_name: None,
        }
    }

    /// Sets the description, builder style.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a node represents.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The tree root.
    App,
    /// A deployable unit rendered to its own template.
    Stack(StackInfo),
    /// A grouping construct with no rendered form of its own.
    Scope,
    /// A template resource.
    Resource(Resource),
    /// A template output.
    Output(Output),
    /// A value consumed by other constructs through lazy values.
    Fragment(Value),
}

struct Node {
    id: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    annotations: Vec<(Severity, String)>,
    dependencies: Vec<NodeId>,
    validators: Vec<Validator>,
}

/// Arena of constructs rooted at the app.
pub struct ConstructTree {
    nodes: Vec<Node>,
    tokens: Vec<Value>,
    default_environment: Environment,
}

impl fmt::Debug for ConstructTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructTree")
            .field("nodes", &self.nodes.len())
            .field("tokens", &self.tokens.len())
            .field("default_environment", &self.default_environment)
            .finish()
    }
}

impl Default for ConstructTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructTree {
    /// Creates a tree containing only the app root.
    #[must_use]
    pub fn new() -> Self {
        Self::with_environment(Environment::default())
    }

    /// Creates a tree whose stacks default to `environment`.
    #[must_use]
    pub fn with_environment(environment: Environment) -> Self {
        let root = Node {
            id: String::new(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::App,
            annotations: Vec::new(),
            dependencies: Vec::new(),
            validators: Vec::new(),
        };
        Self {
            nodes: vec![root],
            tokens: Vec::new(),
            default_environment: environment,
        }
    }

    /// Returns the app root.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Adds a stack below the app root.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or taken, the stack name
    /// does not start with a letter followed by alphanumerics and `-`, or
    /// another stack already deploys under that name.
    pub fn add_stack(&mut self, id: &str, props: StackProps) -> Result<NodeId> {
        let name = props.stack_name.unwrap_or_else(|| id.to_string());
        check_stack_name(&name)?;
        let taken = self
            .stacks()
            .into_iter()
            .find(|&s| self.stack_info(s).is_some_and(|info| info.name == name));
        if let Some(other) = taken.filter(|_| self.find_child(self.root(), id).is_none()) {
            return Err(StratusError::Config {
                message: format!(
                    "stack name \"{name}\" is already used by stack {}",
                    self.path(other)
                ),
            });
        }
        let info = StackInfo {
            name,
            environment: props
                .environment
                .unwrap_or_else(|| self.default_environment.clone()),
            description: props.description,
        };
        tracing::debug!(stack = %info.name, region = %info.environment.region, "adding stack");
        self.insert(self.root(), id, NodeKind::Stack(info))
    }

    /// Adds a grouping construct.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already used by a sibling.
    pub fn add_scope(&mut self, parent: NodeId, id: &str) -> Result<NodeId> {
        self.insert(parent, id, NodeKind::Scope)
    }

    /// Adds a resource construct.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already used by a sibling.
    pub fn add_resource(&mut self, parent: NodeId, id: &str, resource: Resource) -> Result<NodeId> {
        self.insert(parent, id, NodeKind::Resource(resource))
    }

    /// Adds an output construct.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already used by a sibling.
    pub fn add_output(&mut self, parent: NodeId, id: &str, output: Output) -> Result<NodeId> {
        self.insert(parent, id, NodeKind::Output(output))
    }

    /// Adds a fragment construct.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already used by a sibling.
    pub fn add_fragment(&mut self, parent: NodeId, id: &str, value: Value) -> Result<NodeId> {
        self.insert(parent, id, NodeKind::Fragment(value))
    }

    fn insert(&mut self, parent: NodeId, id: &str, kind: NodeKind) -> Result<NodeId> {
        check_construct_id(id)?;

        let is_stack = matches!(kind, NodeKind::Stack(_));
        let parent_is_app = matches!(self.node(parent).kind, NodeKind::App);
        if is_stack != parent_is_app {
            return Err(StratusError::Config {
                message: if is_stack {
                    format!("stack \"{id}\" must be added directly to the app")
                } else {
                    format!("construct \"{id}\" must be added inside a stack")
                },
            });
        }

        if self.find_child(parent, id).is_some() {
            return Err(StratusError::DuplicateConstruct {
                parent: self.display_path(parent),
                id: id.to_string(),
            });
        }

        let node_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id: id.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            kind,
            annotations: Vec::new(),
            dependencies: Vec::new(),
            validators: Vec::new(),
        });
        self.nodes[parent.0].children.push(node_id);
        Ok(node_id)
    }

    fn node(&self, node: NodeId) -> &Node {
        &self.nodes[node.0]
    }

    fn node_mut(&mut self, node: NodeId) -> &mut Node {
        &mut self.nodes[node.0]
    }

    /// Returns the construct id of a node.
    #[must_use]
    pub fn id(&self, node: NodeId) -> &str {
        &self.node(node).id
    }

    /// Returns what a node represents.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.node(node).kind
    }

    /// Returns the parent of a node (`None` for the root).
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    /// Returns the children of a node in insertion order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    /// Finds a direct child by id.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, id: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.id(child) == id)
    }

    /// Returns the ids from the stack down to `node`.
    #[must_use]
    pub fn path_ids(&self, node: NodeId) -> Vec<&str> {
        let mut ids = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            if matches!(self.kind(n), NodeKind::App) {
                break;
            }
            ids.push(self.id(n));
            current = self.parent(n);
        }
        ids.reverse();
        ids
    }

    /// Returns the `/`-separated construct path of `node`.
    #[must_use]
    pub fn path(&self, node: NodeId) -> String {
        self.path_ids(node).join("/")
    }

    /// Path for messages; the root is shown as `<app>`.
    fn display_path(&self, node: NodeId) -> String {
        let path = self.path(node);
        if path.is_empty() { "<app>".to_string() } else { path }
    }

    /// Returns the path components below the owning stack.
    #[must_use]
    pub fn path_components(&self, node: NodeId) -> Vec<&str> {
        self.path_ids(node).into_iter().skip(1).collect()
    }

    /// Returns the stack enclosing `node`, or the node itself if it is a stack.
    #[must_use]
    pub fn stack_of(&self, node: NodeId) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if matches!(self.kind(n), NodeKind::Stack(_)) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Returns the settings of a stack node.
    #[must_use]
    pub fn stack_info(&self, stack: NodeId) -> Option<&StackInfo> {
        match self.kind(stack) {
            NodeKind::Stack(info) => Some(info),
            _ => None,
        }
    }

    /// Returns the environment that applies to `node`.
    #[must_use]
    pub fn environment_of(&self, node: NodeId) -> &Environment {
        self.stack_of(node)
            .and_then(|stack| self.stack_info(stack))
            .map_or(&self.default_environment, |info| &info.environment)
    }

    /// Returns all stacks in insertion order.
    #[must_use]
    pub fn stacks(&self) -> Vec<NodeId> {
        self.children(self.root()).to_vec()
    }

    /// Returns `node` and all of its descendants in preorder.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Returns `true` if `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Returns the resource definition of a node.
    #[must_use]
    pub fn resource(&self, node: NodeId) -> Option<&Resource> {
        match self.kind(node) {
            NodeKind::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Returns the resource definition of a node for mutation.
    pub fn resource_mut(&mut self, node: NodeId) -> Option<&mut Resource> {
        match &mut self.node_mut(node).kind {
            NodeKind::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Returns the output definition of a node.
    #[must_use]
    pub fn output(&self, node: NodeId) -> Option<&Output> {
        match self.kind(node) {
            NodeKind::Output(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the fragment value of a node.
    #[must_use]
    pub fn fragment(&self, node: NodeId) -> Option<&Value> {
        match self.kind(node) {
            NodeKind::Fragment(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the fragment value of a node for mutation.
    pub fn fragment_mut(&mut self, node: NodeId) -> Option<&mut Value> {
        match &mut self.node_mut(node).kind {
            NodeKind::Fragment(value) => Some(value),
            _ => None,
        }
    }

    /// Records that `dependent` must be deployed after `dependency`.
    ///
    /// Both may be any construct; synthesis expands the edge to every
    /// resource below each of them.
    pub fn add_dependency(&mut self, dependent: NodeId, dependency: NodeId) {
        let deps = &mut self.node_mut(dependent).dependencies;
        if !deps.contains(&dependency) {
            deps.push(dependency);
        }
    }

    /// Returns the explicit dependencies of a node.
    #[must_use]
    pub fn dependencies(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).dependencies
    }

    /// Attaches a message to a node.
    pub fn annotate(&mut self, node: NodeId, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(path = %self.path(node), %severity, %message, "annotation added");
        self.node_mut(node).annotations.push((severity, message));
    }

    /// Returns every annotation in the tree, in preorder.
    #[must_use]
    pub fn annotations(&self) -> Vec<Annotation> {
        self.descendants(self.root())
            .into_iter()
            .flat_map(|n| {
                self.node(n)
                    .annotations
                    .iter()
                    .map(move |(severity, message)| Annotation {
                        path: self.display_path(n),
                        severity: *severity,
                        message: message.clone(),
                    })
            })
            .collect()
    }

    /// Registers a validator run against `node` during synthesis.
    pub fn add_validator(
        &mut self,
        node: NodeId,
        validator: impl Fn(&Self, NodeId) -> Vec<String> + Send + Sync + 'static,
    ) {
        self.node_mut(node).validators.push(Box::new(validator));
    }

    /// Runs the validators registered on `node`.
    #[must_use]
    pub fn run_validators(&self, node: NodeId) -> Vec<String> {
        self.node(node)
            .validators
            .iter()
            .flat_map(|validate| validate(self, node))
            .collect()
    }

    /// Builds a construction-time error for `node`.
    #[must_use]
    pub fn error(&self, node: NodeId, message: impl Into<String>) -> StratusError {
        StratusError::validation(self.display_path(node), message)
    }

    /// Registers a deferred value and returns a string standing in for it.
    ///
    /// The string may be embedded in larger strings; the resolver splits it
    /// back out and renders the combination as a join.
    pub fn token_string(&mut self, value: Value) -> String {
        let hint = self.token_hint(&value);
        let index = self.tokens.len();
        self.tokens.push(value);
        format!("{TOKEN_MARKER_START}{hint}.{index}{TOKEN_MARKER_END}")
    }

    fn token_hint(&self, value: &Value) -> String {
        let raw = match value {
            Value::Ref(node) => format!("{}.Ref", self.id(*node)),
            Value::GetAtt(node, attr) => format!("{}.{attr}", self.id(*node)),
            _ => "TOKEN".to_string(),
        };
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect()
    }

    /// Returns the value registered under a token index.
    #[must_use]
    pub fn lookup_token(&self, index: usize) -> Option<&Value> {
        self.tokens.get(index)
    }
}

fn check_construct_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StratusError::InvalidId {
            id: id.to_string(),
            reason: "construct ids cannot be empty",
        });
    }
    if id.contains('/') {
        return Err(StratusError::InvalidId {
            id: id.to_string(),
            reason: "construct ids cannot contain the path separator '/'",
        });
    }
    if id.contains(TOKEN_MARKER_START) {
        return Err(StratusError::InvalidId {
            id: id.to_string(),
            reason: "construct ids cannot contain tokens",
        });
    }
    Ok(())
}

fn check_stack_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StratusError::Config {
            message: format!(
                "stack name \"{name}\" must start with a letter and contain only alphanumeric characters and hyphens"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_stack() -> (ConstructTree, NodeId) {
        let mut tree = ConstructTree::new();
        let stack = tree
            .add_stack("Web", StackProps::default())
            .expect("stack");
        (tree, stack)
    }

    #[test]
    fn paths_exclude_the_app() {
        let (mut tree, stack) = tree_with_stack();
        let svc = tree.add_scope(stack, "Service").expect("scope");
        let res = tree
            .add_resource(svc, "Resource", Resource::new("AWS::ECS::Service"))
            .expect("resource");
        assert_eq!(tree.path(res), "Web/Service/Resource");
        assert_eq!(tree.path_components(res), vec!["Service", "Resource"]);
        assert_eq!(tree.stack_of(res), Some(stack));
    }

    #[test]
    fn duplicate_sibling_ids_are_rejected() {
        let (mut tree, stack) = tree_with_stack();
        let _ = tree.add_scope(stack, "Service").expect("first");
        let err = tree.add_scope(stack, "Service").unwrap_err();
        assert!(matches!(err, StratusError::DuplicateConstruct { .. }), "got: {err}");
    }

    #[test]
    fn duplicate_stack_names_are_rejected() {
        let mut tree = ConstructTree::new();
        let named = |name: &str| StackProps {
            stack_name: Some(name.to_string()),
            ..StackProps::default()
        };
        let _ = tree.add_stack("A", named("Shared")).expect("first");
        let err = tree.add_stack("B", named("Shared")).unwrap_err();
        assert!(err.to_string().contains("already used by stack A"), "got: {err}");

        let _ = tree.add_stack("C", StackProps::default()).expect("distinct");
        let err = tree.add_stack("D", named("C")).unwrap_err();
        assert!(matches!(err, StratusError::Config { .. }), "got: {err}");
        assert_eq!(tree.stacks().len(), 2);
    }

    #[test]
    fn same_id_under_different_parents_is_allowed() {
        let (mut tree, stack) = tree_with_stack();
        let a = tree.add_scope(stack, "A").expect("a");
        let b = tree.add_scope(stack, "B").expect("b");
        assert!(tree.add_scope(a, "Child").is_ok());
        assert!(tree.add_scope(b, "Child").is_ok());
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let (mut tree, stack) = tree_with_stack();
        assert!(matches!(
            tree.add_scope(stack, "").unwrap_err(),
            StratusError::InvalidId { .. }
        ));
        assert!(matches!(
            tree.add_scope(stack, "a/b").unwrap_err(),
            StratusError::InvalidId { .. }
        ));
    }

    #[test]
    fn stacks_only_live_under_the_app() {
        let (mut tree, stack) = tree_with_stack();
        let root = tree.root();
        assert!(tree.add_scope(root, "Loose").is_err());
        let info = StackInfo {
            name: "Nested".into(),
            environment: Environment::default(),
            description: None,
        };
        assert!(tree.insert(stack, "Nested", NodeKind::Stack(info)).is_err());
    }

    #[test]
    fn stack_names_are_checked() {
        let mut tree = ConstructTree::new();
        assert!(tree.add_stack("1abc", StackProps::default()).is_err());
        assert!(tree.add_stack("my_stack", StackProps::default()).is_err());
        assert!(tree.add_stack("my-stack-2", StackProps::default()).is_ok());
    }

    #[test]
    fn stacks_inherit_the_default_environment() {
        let env = Environment {
            region: "ap-south-1".into(),
            ..Environment::default()
        };
        let mut tree = ConstructTree::with_environment(env);
        let stack = tree.add_stack("App", StackProps::default()).expect("stack");
        let scope = tree.add_scope(stack, "Inner").expect("scope");
        assert_eq!(tree.environment_of(scope).region, "ap-south-1");
    }

    #[test]
    fn descendants_are_preorder() {
        let (mut tree, stack) = tree_with_stack();
        let a = tree.add_scope(stack, "A").expect("a");
        let a1 = tree.add_scope(a, "A1").expect("a1");
        let b = tree.add_scope(stack, "B").expect("b");
        assert_eq!(tree.descendants(stack), vec![stack, a, a1, b]);
        assert!(tree.contains(a, a1));
        assert!(!tree.contains(b, a1));
    }

    #[test]
    fn null_properties_are_not_stored() {
        let resource = Resource::new("AWS::X::Y")
            .with_property("Kept", "v")
            .with_property("Dropped", Value::Null);
        assert!(resource.property("Kept").is_some());
        assert!(resource.property("Dropped").is_none());
    }

    #[test]
    fn token_strings_round_trip_through_registry() {
        let (mut tree, stack) = tree_with_stack();
        let lb = tree
            .add_resource(stack, "LB", Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer"))
            .expect("lb");
        let token = tree.token_string(Value::get_att(lb, "DNSName"));
        assert_eq!(token, "${Token[LB.DNSName.0]}");
        assert!(matches!(tree.lookup_token(0), Some(Value::GetAtt(n, a)) if *n == lb && a == "DNSName"));
        assert!(tree.lookup_token(1).is_none());
    }

    #[test]
    fn annotations_carry_paths() {
        let (mut tree, stack) = tree_with_stack();
        let svc = tree.add_scope(stack, "Service").expect("scope");
        tree.annotate(svc, Severity::Warning, "check me");
        let notes = tree.annotations();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].path, "Web/Service");
        assert_eq!(notes[0].severity, Severity::Warning);
    }

    #[test]
    fn validators_run_against_their_node() {
        let (mut tree, stack) = tree_with_stack();
        let svc = tree.add_scope(stack, "Service").expect("scope");
        tree.add_validator(svc, |tree, node| vec![format!("{} failed", tree.id(node))]);
        assert_eq!(tree.run_validators(svc), vec!["Service failed"]);
        assert!(tree.run_validators(stack).is_empty());
    }

    #[test]
    fn dependencies_are_deduplicated() {
        let (mut tree, stack) = tree_with_stack();
        let a = tree.add_scope(stack, "A").expect("a");
        let b = tree.add_scope(stack, "B").expect("b");
        tree.add_dependency(a, b);
        tree.add_dependency(a, b);
        assert_eq!(tree.dependencies(a), &[b]);
    }
}
