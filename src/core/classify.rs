//! Test-unit classification for changed class files.
//!
//! Ordered rules, first match wins:
//! 1. empty or unreadable file -> not a test unit
//! 2. test annotation opens the first non-blank top-level statement -> annotation
//! 3. filename matches a configured pattern (ordered list) -> pattern
//! 4. otherwise -> not a test unit

use std::path::Path;

use glob_match::glob_match;
use serde::Serialize;

use crate::core::git::{ChangedFile, Presence};

/// Platform class-file extension; only these files are considered.
pub const CLASS_EXTENSION: &str = "cls";

/// Annotation marker, matched case-sensitively at the start of a logical line.
pub const TEST_ANNOTATION: &str = "@isTest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionReason {
    Annotation,
    Pattern,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestUnit {
    pub name: String,
    pub reason: DetectionReason,
}

/// Classify one source file. Returns the detection reason when the file is a
/// test unit, `None` otherwise.
pub fn classify(path: &Path, patterns: &[String]) -> Option<DetectionReason> {
    if path.extension().and_then(|e| e.to_str()) != Some(CLASS_EXTENSION) {
        return None;
    }

    let source = match std::fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => s,
        // Rule 1: empty or unreadable files are never test units.
        _ => return None,
    };

    if first_statement_start(&source)
        .map(|stmt| stmt.starts_with(TEST_ANNOTATION))
        .unwrap_or(false)
    {
        return Some(DetectionReason::Annotation);
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    for pattern in patterns {
        if glob_match(pattern, file_name) {
            return Some(DetectionReason::Pattern);
        }
    }

    None
}

/// Collect distinct test units (by unit name, insertion order) from the
/// present changed files under the repository root.
pub fn collect_test_units(
    repo: &Path,
    changed: &[ChangedFile],
    patterns: &[String],
) -> Vec<TestUnit> {
    let mut units: Vec<TestUnit> = Vec::new();

    for file in changed {
        if file.presence != Presence::Present {
            continue;
        }
        let Some(reason) = classify(&repo.join(&file.path), patterns) else {
            continue;
        };
        let Some(name) = file.path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if units.iter().any(|u| u.name == name) {
            continue;
        }
        units.push(TestUnit {
            name: name.to_string(),
            reason,
        });
    }

    units
}

/// Find the first non-blank top-level statement, skipping line and block
/// comments. Returns the source slice starting at that statement.
fn first_statement_start(source: &str) -> Option<&str> {
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &source[i..];
        if bytes[i].is_ascii_whitespace() {
            i += 1;
        } else if rest.starts_with("//") {
            i += rest.find('\n').map(|n| n + 1).unwrap_or(rest.len());
        } else if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(end) => i += 2 + end + 2,
                None => return None, // unterminated comment, nothing follows
            }
        } else {
            return Some(rest);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_class(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn annotation_at_top_classifies_regardless_of_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "Plain.cls", "@isTest\nprivate class Plain {}\n");
        assert_eq!(classify(&path, &[]), Some(DetectionReason::Annotation));
    }

    #[test]
    fn annotation_inside_comment_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(
            dir.path(),
            "Plain.cls",
            "// @isTest once lived here\n/* @isTest */\npublic class Plain {}\n",
        );
        assert_eq!(classify(&path, &[]), None);
    }

    #[test]
    fn annotation_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "Plain.cls", "@ISTEST\nclass Plain {}\n");
        assert_eq!(classify(&path, &[]), None);
    }

    #[test]
    fn pattern_matches_when_annotation_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "AccountTest.cls", "public class AccountTest {}\n");
        let patterns = vec!["*Test.cls".to_string()];
        assert_eq!(classify(&path, &patterns), Some(DetectionReason::Pattern));
    }

    #[test]
    fn first_pattern_match_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "TestAccount.cls", "public class TestAccount {}\n");
        let patterns = vec!["Test*.cls".to_string(), "*Account*".to_string()];
        assert_eq!(classify(&path, &patterns), Some(DetectionReason::Pattern));
    }

    #[test]
    fn empty_file_is_not_a_test_unit_even_if_pattern_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "EmptyTest.cls", "  \n");
        let patterns = vec!["*Test.cls".to_string()];
        assert_eq!(classify(&path, &patterns), None);
    }

    #[test]
    fn collected_units_are_deduplicated_by_name() {
        use crate::core::git::{ChangedFile, Presence};

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/classes")).unwrap();
        write_class(
            &dir.path().join("src/classes"),
            "FooTest.cls",
            "@isTest\nclass FooTest {}\n",
        );

        let changed = vec![
            ChangedFile {
                path: PathBuf::from("src/classes/FooTest.cls"),
                presence: Presence::Present,
            },
            ChangedFile {
                path: PathBuf::from("src/classes/FooTest.cls"),
                presence: Presence::Present,
            },
        ];

        let units = collect_test_units(dir.path(), &changed, &[]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "FooTest");
        assert_eq!(units[0].reason, DetectionReason::Annotation);
    }

    #[test]
    fn non_class_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_class(dir.path(), "page.html", "@isTest\n");
        assert_eq!(classify(&path, &[]), None);
    }
}
