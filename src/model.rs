//! Value types shared by the normalizer, the diff extractor, and the
//! reconciler. Everything here is built once per run and never mutated
//! afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Percentage of `covered` over `total`, or 100 when there is nothing to
/// cover.
#[must_use]
pub fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

/// Canonical form of a repo-relative path, used as the join key between
/// coverage data and diff data.
///
/// Backslashes become forward slashes and any leading `./` segments are
/// removed, so `./src/a.js`, `src/a.js` and `.\src\a.js` all map to
/// `src/a.js`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut rest = path.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped.trim_start_matches('/');
    }
    rest.to_string()
}

/// Execution count of one instrumented line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHit {
    pub line: u32,
    pub hit_count: u64,
}

impl LineHit {
    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.hit_count > 0
    }
}

/// Per-line coverage for a single source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCoverage {
    pub path: String,
    /// Sorted by line number, one entry per instrumented line.
    pub lines: Vec<LineHit>,
}

impl FileCoverage {
    pub fn new(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    /// Build from a line → hit-count map. The map's ordering gives the
    /// sorted `lines` vector for free.
    pub fn from_hits(path: String, hits: BTreeMap<u32, u64>) -> Self {
        let lines = hits
            .into_iter()
            .map(|(line, hit_count)| LineHit { line, hit_count })
            .collect();
        Self { path, lines }
    }
}

/// Line numbers (in the new file version) added or modified by a change,
/// keyed by normalized path.
pub type ChangedLineSet = BTreeMap<String, BTreeSet<u32>>;

/// Coverage of the changed, instrumented lines of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub path: String,
    pub total_lines: u64,
    pub covered_lines: u64,
    pub coverage_percent: f64,
}

impl FileResult {
    #[must_use]
    pub fn new(path: String, total_lines: u64, covered_lines: u64) -> Self {
        Self {
            path,
            total_lines,
            covered_lines,
            coverage_percent: percent(covered_lines, total_lines),
        }
    }
}

/// Coverage of the changed, instrumented lines across the whole change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub total_lines: u64,
    pub covered_lines: u64,
    pub coverage_percent: f64,
    /// Only files with at least one instrumented changed line.
    pub file_results: BTreeMap<String, FileResult>,
}

impl AggregateResult {
    /// Sum the per-file results. With no instrumented changed lines the
    /// coverage is 100%.
    #[must_use]
    pub fn from_files(file_results: BTreeMap<String, FileResult>) -> Self {
        let total_lines = file_results.values().map(|f| f.total_lines).sum();
        let covered_lines = file_results.values().map(|f| f.covered_lines).sum();
        Self {
            total_lines,
            covered_lines,
            coverage_percent: percent(covered_lines, total_lines),
            file_results,
        }
    }
}
