//! Synthesis-time validation of the construct tree.
//!
//! Construction already rejects bad options; this pass catches problems that
//! can only be seen once the tree is complete, such as a listener that never
//! received a default action.

use stratus_common::error::{Result, StratusError};
use stratus_common::types::Severity;

use crate::tree::ConstructTree;

/// Validates the whole tree.
///
/// # Checks performed
///
/// 1. No construct carries an error annotation.
/// 2. Every registered validator passes, visited in preorder.
///
/// # Errors
///
/// Returns [`StratusError::ValidationFailed`] listing every failure.
pub fn validate(tree: &ConstructTree) -> Result<()> {
    tracing::info!("validating construct tree");
    let mut errors = Vec::new();
    check_error_annotations(tree, &mut errors);
    check_validators(tree, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = errors.len(), "validation failed");
        Err(StratusError::ValidationFailed { errors })
    }
}

fn check_error_annotations(tree: &ConstructTree, errors: &mut Vec<String>) {
    errors.extend(
        tree.annotations()
            .into_iter()
            .filter(|note| note.severity == Severity::Error)
            .map(|note| format!("[{}] {}", note.path, note.message)),
    );
}

fn check_validators(tree: &ConstructTree, errors: &mut Vec<String>) {
    for node in tree.descendants(tree.root()) {
        for message in tree.run_validators(node) {
            errors.push(format!("[{}] {message}", tree.path(node)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::StackProps;

    #[test]
    fn empty_tree_is_valid() {
        let tree = ConstructTree::new();
        assert!(validate(&tree).is_ok());
    }

    #[test]
    fn warnings_do_not_fail_validation() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        tree.annotate(stack, Severity::Warning, "just saying");
        assert!(validate(&tree).is_ok());
    }

    #[test]
    fn error_annotations_fail_validation() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        tree.annotate(stack, Severity::Error, "broken");
        let err = validate(&tree).unwrap_err();
        assert!(err.to_string().contains("[Web] broken"), "got: {err}");
    }

    #[test]
    fn all_validator_failures_are_collected() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let a = tree.add_scope(stack, "A").expect("a");
        let b = tree.add_scope(stack, "B").expect("b");
        tree.add_validator(a, |_, _| vec!["first".into()]);
        tree.add_validator(b, |_, _| vec!["second".into(), "third".into()]);

        match validate(&tree).unwrap_err() {
            StratusError::ValidationFailed { errors } => {
                assert_eq!(errors, vec!["[Web/A] first", "[Web/B] second", "[Web/B] third"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
