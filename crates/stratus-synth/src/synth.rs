//! Synthesis: from a construct tree to a cloud assembly.
//!
//! For every stack the driver allocates logical ids, resolves resource
//! properties and outputs, derives the dependency graph from the references
//! found during resolution plus the explicit dependencies recorded on the
//! tree, orders the resources, and renders the template. Stacks are then
//! ordered by the cross-stack dependencies discovered along the way.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use stratus_common::config::{Environment, SynthConfig};
use stratus_common::constants::{
    ASSEMBLY_MANIFEST_FILE, ASSEMBLY_MANIFEST_VERSION, PATH_METADATA_KEY, STACK_ARTIFACT_TYPE,
    TEMPLATE_FILE_SUFFIX,
};
use stratus_common::error::{Result, StratusError};
use stratus_common::types::{Annotation, LogicalId, Severity};

use crate::graph::DependencyGraph;
use crate::logical_id::make_logical_id;
use crate::resolver::Resolver;
use crate::template::{ExportEntry, OutputEntry, ResourceEntry, Template};
use crate::tree::{ConstructTree, NodeId, NodeKind};
use crate::validator;

/// A synthesized stack.
#[derive(Debug, Clone)]
pub struct StackArtifact {
    /// Deployed stack name.
    pub name: String,
    /// Construct path of the stack.
    pub construct_path: String,
    /// Target environment.
    pub environment: Environment,
    /// Rendered template.
    pub template: Template,
    /// Logical ids in deployment order.
    pub deployment_order: Vec<String>,
    /// Names of stacks that must be deployed first.
    pub dependencies: Vec<String>,
}

impl StackArtifact {
    /// Returns the template file name.
    #[must_use]
    pub fn template_file(&self) -> String {
        format!("{}{TEMPLATE_FILE_SUFFIX}", self.name)
    }
}

/// The output of a synthesis run.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    /// Stacks in deployment order.
    pub stacks: Vec<StackArtifact>,
    /// Every annotation found in the tree.
    pub annotations: Vec<Annotation>,
}

/// Serialized form of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// Manifest schema version.
    pub version: String,
    /// Artifacts keyed by stack name.
    pub artifacts: BTreeMap<String, ArtifactManifest>,
}

/// One stack entry of the assembly manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Artifact type.
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// `aws://account/region`.
    pub environment: String,
    /// Artifact properties.
    pub properties: ArtifactProperties,
    /// Stacks deployed before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Annotations keyed by construct path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Vec<MetadataEntry>>,
}

/// Properties of a stack artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    /// Template file name relative to the assembly directory.
    pub template_file: String,
}

/// A single annotation in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Severity.
    #[serde(rename = "type")]
    pub severity: Severity,
    /// Message text.
    pub data: String,
}

impl CloudAssembly {
    /// Returns a stack artifact by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Returns the warning annotations.
    pub fn warnings(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .filter(|note| note.severity == Severity::Warning)
    }

    /// Builds the assembly manifest.
    #[must_use]
    pub fn manifest(&self) -> AssemblyManifest {
        let artifacts = self
            .stacks
            .iter()
            .map(|stack| {
                let mut metadata: BTreeMap<String, Vec<MetadataEntry>> = BTreeMap::new();
                for note in &self.annotations {
                    let belongs = note.path == stack.construct_path
                        || note.path.starts_with(&format!("{}/", stack.construct_path));
                    if belongs {
                        metadata
                            .entry(format!("/{}", note.path))
                            .or_default()
                            .push(MetadataEntry {
                                severity: note.severity,
                                data: note.message.clone(),
                            });
                    }
                }
                let artifact = ArtifactManifest {
                    artifact_type: STACK_ARTIFACT_TYPE.to_string(),
                    environment: stack.environment.uri(),
                    properties: ArtifactProperties {
                        template_file: stack.template_file(),
                    },
                    dependencies: stack.dependencies.clone(),
                    metadata,
                };
                (stack.name.clone(), artifact)
            })
            .collect();

        AssemblyManifest {
            version: ASSEMBLY_MANIFEST_VERSION.to_string(),
            artifacts,
        }
    }

    /// Writes every template and the manifest into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written.
    pub fn write(&self, dir: &Path) -> Result<()> {
        tracing::info!(dir = %dir.display(), stacks = self.stacks.len(), "writing cloud assembly");
        std::fs::create_dir_all(dir).map_err(|source| StratusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for stack in &self.stacks {
            let path = dir.join(stack.template_file());
            write_file(&path, &stack.template.to_json_pretty()?)?;
        }

        let manifest = serde_json::to_string_pretty(&self.manifest())?;
        write_file(&dir.join(ASSEMBLY_MANIFEST_FILE), &manifest)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    tracing::debug!(path = %path.display(), bytes = contents.len(), "writing file");
    std::fs::write(path, contents).map_err(|source| StratusError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Synthesizes every stack of the tree.
///
/// # Errors
///
/// Returns an error if validation fails (including warnings in strict
/// mode), a value cannot be resolved, logical ids collide, or resources or
/// stacks depend on each other cyclically.
pub fn synthesize(tree: &ConstructTree, config: &SynthConfig) -> Result<CloudAssembly> {
    let _span = tracing::info_span!("synthesize").entered();
    validator::validate(tree)?;

    let annotations = tree.annotations();
    let warnings: Vec<&Annotation> = annotations
        .iter()
        .filter(|note| note.severity == Severity::Warning)
        .collect();
    for note in &warnings {
        tracing::warn!(path = %note.path, "{}", note.message);
    }
    if config.strict && !warnings.is_empty() {
        return Err(StratusError::ValidationFailed {
            errors: warnings
                .iter()
                .map(|note| format!("[{}] {}", note.path, note.message))
                .collect(),
        });
    }

    let mut stack_graph = DependencyGraph::new();
    let mut artifacts: BTreeMap<String, StackArtifact> = BTreeMap::new();
    for stack in tree.stacks() {
        let artifact = synthesize_stack(tree, stack, &mut stack_graph)?;
        let _ = artifacts.insert(artifact.name.clone(), artifact);
    }

    let order = stack_graph.resolve_order()?;
    let stacks: Vec<StackArtifact> = order
        .iter()
        .filter_map(|name| {
            artifacts.remove(name).map(|mut artifact| {
                artifact.dependencies = stack_graph.dependencies_of(name);
                artifact
            })
        })
        .collect();

    tracing::info!(stacks = stacks.len(), warnings = warnings.len(), "synthesis complete");
    Ok(CloudAssembly { stacks, annotations })
}

fn synthesize_stack(
    tree: &ConstructTree,
    stack: NodeId,
    stack_graph: &mut DependencyGraph,
) -> Result<StackArtifact> {
    let info = tree.stack_info(stack).ok_or_else(|| StratusError::NotFound {
        kind: "stack",
        id: tree.path(stack),
    })?;
    let _span = tracing::info_span!("stack", name = %info.name).entered();
    let _ = stack_graph.add_node(info.name.clone());
    record_stack_dependencies(tree, stack, &info.name, stack_graph);

    let members: Vec<NodeId> = tree
        .descendants(stack)
        .into_iter()
        .filter(|&n| matches!(tree.kind(n), NodeKind::Resource(_) | NodeKind::Output(_)))
        .collect();
    let logical_ids = allocate_logical_ids(tree, &info.name, &members)?;

    let mut graph = DependencyGraph::new();
    let mut template = Template::new(info.description.clone());

    for &node in &members {
        let id = logical_ids[&node].as_str();
        let mut resolver = Resolver::new(tree, stack, &logical_ids);
        match tree.kind(node) {
            NodeKind::Resource(resource) => {
                tracing::debug!(logical_id = id, resource_type = %resource.resource_type, "resolving resource");
                let _ = graph.add_node(id);

                let mut properties = serde_json::Map::new();
                for (key, value) in &resource.properties {
                    if let Some(json) = resolver.resolve(value)? {
                        let _ = properties.insert(key.clone(), json);
                    }
                }
                for target in resolver.take_references() {
                    graph.add_dependency(id, logical_ids[&target].as_str());
                }

                let mut depends_on = BTreeSet::new();
                for target in explicit_dependencies(tree, node) {
                    if tree.stack_of(target) == Some(stack) {
                        let target_id = logical_ids[&target].as_str();
                        graph.add_dependency(id, target_id);
                        let _ = depends_on.insert(target_id.to_string());
                    }
                }

                let mut metadata = BTreeMap::new();
                let _ = metadata.insert(PATH_METADATA_KEY.to_string(), Json::String(tree.path(node)));
                let policy = resource
                    .removal_policy
                    .map(|p| p.as_template_value().to_string());

                let _ = template.resources.insert(
                    id.to_string(),
                    ResourceEntry {
                        resource_type: resource.resource_type.clone(),
                        properties,
                        depends_on: depends_on.into_iter().collect(),
                        deletion_policy: policy.clone(),
                        update_replace_policy: policy,
                        metadata,
                    },
                );
            }
            NodeKind::Output(output) => {
                let value = resolver.resolve(&output.value)?.unwrap_or(Json::Null);
                let _ = template.outputs.insert(
                    id.to_string(),
                    OutputEntry {
                        value,
                        description: output.description.clone(),
                        export: output
                            .export_name
                            .clone()
                            .map(|name| ExportEntry { name }),
                    },
                );
            }
            _ => {}
        }
    }

    let deployment_order = graph.resolve_order()?;
    tracing::info!(resources = template.resources.len(), outputs = template.outputs.len(), "stack rendered");

    Ok(StackArtifact {
        name: info.name.clone(),
        construct_path: tree.path(stack),
        environment: info.environment.clone(),
        template,
        deployment_order,
        dependencies: Vec::new(),
    })
}

fn allocate_logical_ids(
    tree: &ConstructTree,
    stack_name: &str,
    members: &[NodeId],
) -> Result<BTreeMap<NodeId, LogicalId>> {
    let mut ids = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for &node in members {
        let id = make_logical_id(&tree.path_components(node));
        if !seen.insert(id.clone()) {
            return Err(StratusError::DuplicateLogicalId {
                stack: stack_name.to_string(),
                logical_id: id.to_string(),
            });
        }
        let _ = ids.insert(node, id);
    }
    Ok(ids)
}

/// Turns every explicit dependency from a construct of `stack` (the stack
/// itself included) onto a construct of another stack into a stack edge.
/// The target stack need not contain any resources.
fn record_stack_dependencies(
    tree: &ConstructTree,
    stack: NodeId,
    name: &str,
    stack_graph: &mut DependencyGraph,
) {
    for node in tree.descendants(stack) {
        for &dependency in tree.dependencies(node) {
            let other = tree
                .stack_of(dependency)
                .filter(|&other| other != stack)
                .and_then(|other| tree.stack_info(other));
            if let Some(other) = other {
                tracing::debug!(stack = name, depends_on = %other.name, "stack dependency");
                stack_graph.add_dependency(name, &other.name);
            }
        }
    }
}

/// Expands the explicit dependencies of `node` and its ancestors into the
/// resources they cover. Dependencies on a construct that contains `node`
/// are skipped, and dependencies recorded on the stack itself are handled
/// by [`record_stack_dependencies`].
fn explicit_dependencies(tree: &ConstructTree, node: NodeId) -> BTreeSet<NodeId> {
    let mut targets = BTreeSet::new();
    let mut current = Some(node);
    while let Some(scope) = current {
        if matches!(tree.kind(scope), NodeKind::Stack(_) | NodeKind::App) {
            break;
        }
        for &dependency in tree.dependencies(scope) {
            if tree.contains(dependency, node) {
                continue;
            }
            targets.extend(
                tree.descendants(dependency)
                    .into_iter()
                    .filter(|&n| n != node && tree.resource(n).is_some()),
            );
        }
        current = tree.parent(scope);
    }
    targets
}
