#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Write `contents` to `name` inside a fresh temporary directory, returning
/// the dir handle and the file path. The caller must hold onto `TempDir`
/// to keep the temp directory alive.
pub fn write_artifact(name: &str, contents: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

/// Hits of a parsed file as `(line, hit_count)` pairs.
pub fn hits(file: &prcov::model::FileCoverage) -> Vec<(u32, u64)> {
    file.lines.iter().map(|l| (l.line, l.hit_count)).collect()
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
