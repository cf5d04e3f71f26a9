//! Join coverage data against the changed-line set.
//!
//! Only lines that are both changed and instrumented count. A changed line
//! the coverage tool never saw (a comment, a blank line, an import) is
//! neither covered nor missed, and a file with no such lines does not
//! appear in the result at all.

use std::collections::BTreeMap;

use crate::model::{normalize_path, AggregateResult, ChangedLineSet, FileCoverage, FileResult};

/// Compute coverage of the changed lines.
///
/// Deterministic and infallible: files missing on either side simply
/// contribute nothing. Pass/fail policy is left to the caller.
#[must_use]
pub fn reconcile(coverage: &[FileCoverage], changed: &ChangedLineSet) -> AggregateResult {
    let merged = merge_hits(coverage);
    let mut file_results: BTreeMap<String, FileResult> = BTreeMap::new();

    for (path, hits) in &merged {
        let Some(lines) = changed.get(path) else {
            continue;
        };
        if lines.is_empty() {
            continue;
        }

        let (total, covered) = hits
            .iter()
            .filter(|(line, _)| lines.contains(*line))
            .fold((0u64, 0u64), |(total, covered), (_, &hit_count)| {
                (total + 1, covered + u64::from(hit_count > 0))
            });

        if total == 0 {
            tracing::debug!(path = %path, "no instrumented lines among changed lines");
            continue;
        }
        file_results.insert(path.clone(), FileResult::new(path.clone(), total, covered));
    }

    for (path, lines) in changed {
        if !lines.is_empty() && !merged.contains_key(path) {
            tracing::debug!(
                path = path.as_str(),
                changed = lines.len(),
                "changed file has no coverage data"
            );
        }
    }

    AggregateResult::from_files(file_results)
}

/// Per-line hit counts keyed by normalized path.
///
/// Entries that normalize to the same path (`./a.js` and `a.js`) are folded
/// into one, keeping the highest count seen for each line.
#[must_use]
pub fn merge_hits(coverage: &[FileCoverage]) -> BTreeMap<String, BTreeMap<u32, u64>> {
    let mut merged: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();
    for file in coverage {
        let hits = merged.entry(normalize_path(&file.path)).or_default();
        for hit in &file.lines {
            hits.entry(hit.line)
                .and_modify(|count| *count = (*count).max(hit.hit_count))
                .or_insert(hit.hit_count);
        }
    }
    merged
}
