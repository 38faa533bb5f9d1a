//! Logical id allocation.
//!
//! Ids are derived from the construct path below the stack so that they
//! stay stable across runs: a readable prefix built from the path
//! components, followed by a short hash of the full path that keeps
//! distinct paths from colliding.

use sha2::{Digest, Sha256};
use stratus_common::constants::{
    HIDDEN_FROM_HUMAN_ID, HIDDEN_ID, LOGICAL_ID_HASH_LENGTH, MAX_HUMAN_ID_LENGTH,
    MAX_LOGICAL_ID_LENGTH,
};
use stratus_common::types::LogicalId;

/// Builds the logical id for a construct from its path components.
///
/// `Default` components are dropped. A single remaining component is used
/// as-is (minus non-alphanumerics); otherwise the id is the human-readable
/// concatenation of the components followed by an 8-character path hash.
#[must_use]
pub fn make_logical_id(components: &[&str]) -> LogicalId {
    let components: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if let [single] = components.as_slice() {
        let candidate = remove_non_alphanumeric(single);
        if !candidate.is_empty() && candidate.len() <= MAX_LOGICAL_ID_LENGTH {
            return LogicalId::new(candidate);
        }
    }

    let hash = path_hash(&components);
    let human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect::<String>()
        .chars()
        .take(MAX_HUMAN_ID_LENGTH)
        .collect();

    LogicalId::new(format!("{human}{hash}"))
}

fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join("/").as_bytes());
    digest
        .iter()
        .take(LOGICAL_ID_HASH_LENGTH / 2)
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Drops a component when the previous kept one already ends with it,
/// so `Service/Service` reads as `Service`.
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut kept: Vec<&str> = Vec::new();
    for &component in components {
        if kept.last().is_some_and(|prev| prev.ends_with(component)) {
            continue;
        }
        kept.push(component);
    }
    kept
}

fn remove_non_alphanumeric(component: &str) -> String {
    component
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_resource_keeps_its_name() {
        assert_eq!(make_logical_id(&["MyBucket"]).as_str(), "MyBucket");
    }

    #[test]
    fn top_level_name_is_sanitized() {
        assert_eq!(make_logical_id(&["my-bucket_1"]).as_str(), "mybucket1");
    }

    #[test]
    fn nested_id_has_human_prefix_and_hash() {
        let id = make_logical_id(&["Web", "LB", "Resource"]);
        let text = id.as_str();
        assert!(text.starts_with("WebLB"), "got: {text}");
        assert_eq!(text.len(), "WebLB".len() + 8);
        assert!(text[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn resource_component_still_affects_hash() {
        let a = make_logical_id(&["Web", "LB", "Resource"]);
        let b = make_logical_id(&["Web", "LB"]);
        assert_ne!(a, b);
    }

    #[test]
    fn default_component_is_invisible() {
        assert_eq!(
            make_logical_id(&["Web", "Default"]),
            make_logical_id(&["Web"])
        );
        assert_eq!(
            make_logical_id(&["Web", "Default", "LB"]),
            make_logical_id(&["Web", "LB"])
        );
    }

    #[test]
    fn repeated_components_are_collapsed_in_human_part() {
        let id = make_logical_id(&["Service", "Service", "Resource"]);
        assert!(id.as_str().starts_with("Service"), "got: {id}");
        assert_eq!(id.as_str().len(), "Service".len() + 8);
    }

    #[test]
    fn ids_are_deterministic() {
        let first = make_logical_id(&["Stack", "Web", "TaskDef"]);
        let second = make_logical_id(&["Stack", "Web", "TaskDef"]);
        assert_eq!(first, second);
    }

    #[test]
    fn long_paths_are_truncated() {
        let first = "A".repeat(200);
        let second = "C".repeat(200);
        let id = make_logical_id(&[first.as_str(), second.as_str(), "B"]);
        assert!(id.as_str().len() <= MAX_LOGICAL_ID_LENGTH);
        assert_eq!(id.as_str().len(), MAX_HUMAN_ID_LENGTH + 8);
    }
}
