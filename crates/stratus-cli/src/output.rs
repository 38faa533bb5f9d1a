//! Formatted output helpers for CLI commands.

use stratus_common::types::{Annotation, Severity};

/// Formats a count with its noun, pluralized with a trailing `s`.
#[must_use]
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Heading underline of the given width.
#[must_use]
pub fn rule(width: usize) -> String {
    "\u{2550}".repeat(width)
}

/// One line per annotation, prefixed with a severity marker.
#[must_use]
pub fn annotation_line(note: &Annotation) -> String {
    let marker = match note.severity {
        Severity::Info => "i",
        Severity::Warning => "!",
        Severity::Error => "x",
    };
    format!("  {marker} {note}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_keeps_singular_for_one() {
        assert_eq!(plural(1, "stack"), "1 stack");
        assert_eq!(plural(0, "stack"), "0 stacks");
        assert_eq!(plural(12, "resource"), "12 resources");
    }

    #[test]
    fn rule_repeats_box_character() {
        assert_eq!(rule(3).chars().count(), 3);
        assert!(rule(0).is_empty());
    }

    #[test]
    fn annotation_line_marks_warnings() {
        let note = Annotation {
            path: "App/Web".to_string(),
            severity: Severity::Warning,
            message: "default action replaced".to_string(),
        };
        assert_eq!(annotation_line(&note), "  ! [App/Web] warning: default action replaced");
    }
}
