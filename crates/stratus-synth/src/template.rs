//! Rendered template model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use stratus_common::constants::TEMPLATE_FORMAT_VERSION;

/// A rendered stack template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Template format version.
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    /// Template description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resources keyed by logical id.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,
    /// Outputs keyed by logical id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputEntry>,
}

impl Template {
    /// Creates an empty template.
    #[must_use]
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Returns the resources of a given type, in logical id order.
    #[must_use]
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&str, &ResourceEntry)> {
        self.resources
            .iter()
            .filter(|(_, entry)| entry.resource_type == resource_type)
            .map(|(id, entry)| (id.as_str(), entry))
            .collect()
    }

    /// Returns the single resource of a given type, if exactly one exists.
    #[must_use]
    pub fn only_resource_of_type(&self, resource_type: &str) -> Option<(&str, &ResourceEntry)> {
        match self.resources_of_type(resource_type).as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Serializes the template as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> stratus_common::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A rendered resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceEntry {
    /// Provider type name.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resolved properties.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Json>,
    /// Explicit dependencies, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Deletion policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    /// Replacement policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
    /// Metadata, including the construct path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Json>,
}

impl ResourceEntry {
    /// Returns a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Json> {
        self.properties.get(name)
    }
}

/// A rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputEntry {
    /// Resolved value.
    pub value: Json,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Export declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportEntry>,
}

/// Export of an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportEntry {
    /// Export name.
    pub name: String,
}
