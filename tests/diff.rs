mod common;

use std::collections::BTreeSet;

use prcov::diff::{changed_line_set, FileStatus, PullRequestChangeSource, UnifiedDiff};

/// A git diff with a modified, a deleted, and a docs-only file.
#[test]
fn changed_lines_from_pull_request_diff() {
    let source = UnifiedDiff::from_file(&common::fixture("diffs/pull_request.diff")).unwrap();
    let files = source.changed_files().unwrap();

    assert_eq!(files.len(), 3);
    assert_eq!(files[1].status, FileStatus::Removed);

    let changed = changed_line_set(&files);
    assert_eq!(changed.len(), 2);
    assert_eq!(changed["src/lib.js"], BTreeSet::from([3, 4]));
    assert_eq!(changed["README.md"], BTreeSet::from([2]));
    assert!(!changed.contains_key("src/util.js"));
}

#[test]
fn diff_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(UnifiedDiff::from_file(&dir.path().join("nope.diff")).is_err());
}
