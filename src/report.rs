//! Pass/fail policy and output formatting for diff coverage results.

use std::collections::BTreeMap;
use std::fmt::Write;

use anyhow::Result;

use crate::model::{AggregateResult, ChangedLineSet, FileCoverage};
use crate::reconcile::merge_hits;

/// Outcome of comparing diff coverage against a minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Pass when coverage meets or exceeds `threshold` (a percentage).
    #[must_use]
    pub fn evaluate(result: &AggregateResult, threshold: f64) -> Self {
        if result.coverage_percent >= threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    #[must_use]
    pub fn passed(self) -> bool {
        self == Verdict::Pass
    }
}

/// Changed, instrumented lines of one file, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLines {
    pub covered_lines: Vec<u32>,
    pub missed_lines: Vec<u32>,
}

impl FileLines {
    /// Every changed line with instrumentation, sorted.
    #[must_use]
    pub fn all_instrumentable(&self) -> Vec<u32> {
        let mut all: Vec<u32> = self
            .covered_lines
            .iter()
            .chain(&self.missed_lines)
            .copied()
            .collect();
        all.sort_unstable();
        all
    }
}

/// Diff coverage data, ready to be formatted.
#[derive(Debug)]
pub struct DiffCoverageReport {
    /// Files in the change that have a new version.
    pub diff_files: usize,
    /// Total number of changed lines across all files.
    pub diff_lines: usize,
    pub result: AggregateResult,
    /// Line detail for files in `result.file_results`.
    pub lines: BTreeMap<String, FileLines>,
    /// Minimum passing coverage, as a percentage.
    pub threshold: f64,
    /// Commit SHA to display.
    pub sha: Option<String>,
}

impl DiffCoverageReport {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        Verdict::evaluate(&self.result, self.threshold)
    }

    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }

    /// Files with at least one missed line, worst coverage first.
    fn files_with_misses(&self) -> Vec<(&str, &FileLines, f64)> {
        let mut files: Vec<_> = self
            .lines
            .iter()
            .filter(|(_, l)| !l.missed_lines.is_empty())
            .map(|(path, l)| {
                let pct = self
                    .result
                    .file_results
                    .get(path)
                    .map_or(0.0, |f| f.coverage_percent);
                (path.as_str(), l, pct)
            })
            .collect();
        files.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(b.0)));
        files
    }
}

/// Build a [`DiffCoverageReport`] from the reconciled result plus the
/// inputs it was computed from.
pub fn build_report(
    result: AggregateResult,
    changed: &ChangedLineSet,
    coverage: &[FileCoverage],
    threshold: f64,
    sha: Option<&str>,
) -> DiffCoverageReport {
    let mut lines: BTreeMap<String, FileLines> = BTreeMap::new();
    for (path, hits) in merge_hits(coverage) {
        if !result.file_results.contains_key(&path) {
            continue;
        }
        let Some(changed_lines) = changed.get(&path) else {
            continue;
        };
        let entry = lines.entry(path).or_default();
        // Hits are keyed by line, so both lists come out sorted.
        for (line, hit_count) in hits.into_iter().filter(|(l, _)| changed_lines.contains(l)) {
            if hit_count > 0 {
                entry.covered_lines.push(line);
            } else {
                entry.missed_lines.push(line);
            }
        }
    }

    DiffCoverageReport {
        diff_files: changed.len(),
        diff_lines: changed.values().map(|v| v.len()).sum(),
        result,
        lines,
        threshold,
        sha: sha.map(|s| s.to_owned()),
    }
}

// ---------------------------------------------------------------------------
// Formatters
// ---------------------------------------------------------------------------

/// Trait for formatting diff coverage reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &DiffCoverageReport) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let mut out = String::new();

        if report.diff_lines == 0 {
            out.push_str("No added lines found in diff.\n");
        } else if report.result.total_lines == 0 {
            let lines = report.diff_lines;
            let files = report.diff_files;
            writeln!(
                out,
                "{lines} lines changed across {files} files, none are instrumented."
            )
            .unwrap();
        } else {
            let pct = report.result.coverage_percent;
            let covered = report.result.covered_lines;
            let total = report.result.total_lines;
            writeln!(
                out,
                "Diff coverage: {pct:.1}% ({covered}/{total} lines covered)"
            )
            .unwrap();

            let files_with_misses = report.files_with_misses();
            if !files_with_misses.is_empty() {
                out.push('\n');
                for (path, lines, file_rate) in &files_with_misses {
                    let file_covered = lines.covered_lines.len();
                    let file_total = file_covered + lines.missed_lines.len();
                    let missed =
                        format_line_ranges(&lines.missed_lines, &lines.all_instrumentable());
                    writeln!(
                        out,
                        "  {path}  {file_covered}/{file_total} ({file_rate:.1}%)  missed: {missed}",
                    )
                    .unwrap();
                }
            }
        }

        let threshold = report.threshold;
        let status = match report.verdict() {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        };
        writeln!(out, "\n{status} (threshold {threshold:.1}%)").unwrap();
        out
    }
}

/// Markdown formatter, used for pull request comments.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let mut md = String::new();

        let diff_rate = report.result.coverage_percent;
        let icon = match report.verdict() {
            Verdict::Pass => "✅",
            Verdict::Fail => "❌",
        };
        writeln!(md, "### {icon} Diff Coverage: {diff_rate:.1}%\n").unwrap();

        let covered = report.result.covered_lines;
        let total = report.result.total_lines;
        write!(md, "**{covered}** of **{total}** changed lines covered").unwrap();
        if let Some(ref sha) = report.sha {
            let short_sha = if sha.len() > 7 { &sha[..7] } else { sha };
            write!(md, " ({short_sha})").unwrap();
        }
        let threshold = report.threshold;
        writeln!(md, ", minimum **{threshold:.1}%**").unwrap();

        let files_with_misses = report.files_with_misses();

        if total == 0 {
            md.push_str("\nNo instrumented lines were changed.\n");
        } else if files_with_misses.is_empty() {
            md.push_str("\nAll changed lines are covered! 🎉\n");
        } else {
            md.push_str("\n| File | Covered | Missed | Diff |\n");
            md.push_str("|:-----|--------:|-------:|-----:|\n");

            for (path, lines, file_rate) in &files_with_misses {
                let covered_count = lines.covered_lines.len();
                let missed_count = lines.missed_lines.len();
                writeln!(
                    md,
                    "| `{path}` | {covered_count} | {missed_count} | {file_rate:.0}% |"
                )
                .unwrap();
            }

            md.push_str("\n<details>\n<summary>Missed lines</summary>\n\n");

            for (path, lines, _) in &files_with_misses {
                let all_instrumentable = lines.all_instrumentable();
                let ranges = if let Some(ref sha) = report.sha {
                    format_line_ranges_linked(&lines.missed_lines, &all_instrumentable, sha, path)
                } else {
                    format_line_ranges(&lines.missed_lines, &all_instrumentable)
                };
                writeln!(md, "**`{path}`**: {ranges}\n").unwrap();
            }

            md.push_str("</details>\n");
        }

        md.push_str("\n<sub>prcov</sub>\n");
        md
    }
}

/// JSON formatter, for machine consumers.
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &DiffCoverageReport) -> String {
        let missed: BTreeMap<&str, &[u32]> = report
            .lines
            .iter()
            .map(|(path, l)| (path.as_str(), l.missed_lines.as_slice()))
            .collect();
        let value = serde_json::json!({
            "passed": report.verdict().passed(),
            "threshold": report.threshold,
            "sha": report.sha,
            "diff_files": report.diff_files,
            "diff_lines": report.diff_lines,
            "coverage": report.result,
            "missed_lines": missed,
        });
        format!("{value:#}\n")
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for a formatted report.
pub trait ReportSink {
    fn publish(&self, body: &str) -> Result<()>;
}

/// Writes the report to stdout.
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn publish(&self, body: &str) -> Result<()> {
        use std::io::Write as _;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(body.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Line ranges
// ---------------------------------------------------------------------------

/// Maximum number of consecutive non-instrumentable lines that can be bridged
/// when coalescing uncovered ranges. Gaps of up to this many lines (where none
/// of the gap lines are instrumentable) are merged into a single range.
const MAX_BRIDGE_GAP: u32 = 2;

/// Coalesce sorted line numbers into `(start, end)` ranges, bridging small
/// gaps where every line in the gap is non-instrumentable.
///
/// A gap between two uncovered lines is bridged only when:
/// 1. Every line in the gap is absent from `all_instrumentable`, AND
/// 2. The gap is at most [`MAX_BRIDGE_GAP`] lines wide.
///
/// Both `lines` and `all_instrumentable` must be sorted and deduplicated.
#[must_use]
pub fn coalesce_ranges(lines: &[u32], all_instrumentable: &[u32]) -> Vec<(u32, u32)> {
    if lines.is_empty() {
        return Vec::new();
    }

    debug_assert!(
        lines.windows(2).all(|w| w[0] < w[1]),
        "coalesce_ranges requires sorted, deduplicated input"
    );

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let mut start = lines[0];
    let mut end = lines[0];

    for &line in &lines[1..] {
        let gap = line - end - 1;
        if gap <= MAX_BRIDGE_GAP
            && (end + 1..line).all(|l| all_instrumentable.binary_search(&l).is_err())
        {
            end = line;
        } else {
            ranges.push((start, end));
            start = line;
            end = line;
        }
    }

    ranges.push((start, end));
    ranges
}

/// Format line numbers into compact range notation with markdown links.
///
/// Each line number becomes a link like `[N](../blob/{sha}/{path}#LN)`.
#[must_use]
pub fn format_line_ranges_linked(
    lines: &[u32],
    all_instrumentable: &[u32],
    sha: &str,
    path: &str,
) -> String {
    coalesce_ranges(lines, all_instrumentable)
        .iter()
        .map(|&(start, end)| {
            if start == end {
                format!("[{start}](../blob/{sha}/{path}#L{start})")
            } else {
                format!("[{start}-{end}](../blob/{sha}/{path}#L{start}-L{end})")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format line numbers into compact range notation, e.g. "1, 3-5, 8".
#[must_use]
pub fn format_line_ranges(lines: &[u32], all_instrumentable: &[u32]) -> String {
    coalesce_ranges(lines, all_instrumentable)
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{FileResult, LineHit};
    use crate::reconcile::reconcile;

    fn sample_report(threshold: f64, sha: Option<&str>) -> DiffCoverageReport {
        let coverage = vec![FileCoverage {
            path: "src/foo.js".to_string(),
            lines: [(1, 1), (2, 1), (3, 1), (5, 0), (6, 0)]
                .into_iter()
                .map(|(line, hit_count)| LineHit { line, hit_count })
                .collect(),
        }];
        let changed = ChangedLineSet::from([(
            "src/foo.js".to_string(),
            BTreeSet::from([1, 2, 3, 4, 5, 6]),
        )]);
        let result = reconcile(&coverage, &changed);
        build_report(result, &changed, &coverage, threshold, sha)
    }

    // -- Verdict tests --------------------------------------------------------

    #[test]
    fn test_verdict_threshold_is_inclusive() {
        let mut files = BTreeMap::new();
        files.insert("a.js".to_string(), FileResult::new("a.js".to_string(), 4, 3));
        let result = AggregateResult::from_files(files);
        assert_eq!(Verdict::evaluate(&result, 75.0), Verdict::Pass);
        assert_eq!(Verdict::evaluate(&result, 75.1), Verdict::Fail);
    }

    #[test]
    fn test_verdict_vacuous_pass() {
        let result = AggregateResult::from_files(BTreeMap::new());
        assert!(Verdict::evaluate(&result, 100.0).passed());
    }

    #[test]
    fn test_build_report_splits_lines() {
        let report = sample_report(80.0, None);
        assert_eq!(report.diff_files, 1);
        assert_eq!(report.diff_lines, 6);
        let lines = &report.lines["src/foo.js"];
        assert_eq!(lines.covered_lines, vec![1, 2, 3]);
        assert_eq!(lines.missed_lines, vec![5, 6]);
        assert_eq!(lines.all_instrumentable(), vec![1, 2, 3, 5, 6]);
        assert_eq!(report.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_build_report_merges_duplicate_paths() {
        let entry = |path: &str, hits: &[(u32, u64)]| FileCoverage {
            path: path.to_string(),
            lines: hits
                .iter()
                .map(|&(line, hit_count)| LineHit { line, hit_count })
                .collect(),
        };
        let coverage = vec![entry("./a.js", &[(1, 0), (2, 0)]), entry("a.js", &[(1, 5)])];
        let changed = ChangedLineSet::from([("a.js".to_string(), BTreeSet::from([1, 2]))]);
        let result = reconcile(&coverage, &changed);

        let report = build_report(result, &changed, &coverage, 80.0, None);

        let lines = &report.lines["a.js"];
        assert_eq!(lines.covered_lines, vec![1]);
        assert_eq!(lines.missed_lines, vec![2]);
        assert_eq!(report.result.total_lines, 2);
    }

    // -- coalesce_ranges tests -----------------------------------------------

    #[test]
    fn test_coalesce_ranges_empty() {
        assert_eq!(coalesce_ranges(&[], &[]), Vec::<(u32, u32)>::new());
    }

    #[test]
    fn test_coalesce_ranges_consecutive() {
        assert_eq!(coalesce_ranges(&[1, 2, 3], &[1, 2, 3]), vec![(1, 3)]);
    }

    #[test]
    fn test_coalesce_ranges_bridges_non_instrumentable() {
        // Lines 3,4 not instrumentable → bridge
        assert_eq!(coalesce_ranges(&[1, 2, 5, 6], &[1, 2, 5, 6]), vec![(1, 6)]);
    }

    #[test]
    fn test_coalesce_ranges_no_bridge_three_non_instrumentable() {
        assert_eq!(
            coalesce_ranges(&[1, 2, 6, 7], &[1, 2, 6, 7]),
            vec![(1, 2), (6, 7)]
        );
    }

    #[test]
    fn test_coalesce_ranges_no_bridge_covered_in_gap() {
        // Line 3 is instrumentable (covered) → no bridge
        assert_eq!(
            coalesce_ranges(&[1, 2, 4, 5], &[1, 2, 3, 4, 5]),
            vec![(1, 2), (4, 5)]
        );
    }

    // -- format_line_ranges tests -------------------------------------------

    #[test]
    fn test_format_line_ranges_mixed() {
        assert_eq!(
            format_line_ranges(&[1, 3, 4, 5, 10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            "1, 3-5, 10"
        );
    }

    #[test]
    fn test_format_line_ranges_linked() {
        assert_eq!(
            format_line_ranges_linked(&[1, 3, 4], &[1, 2, 3, 4], "abc123", "src/foo.js"),
            "[1](../blob/abc123/src/foo.js#L1), [3-4](../blob/abc123/src/foo.js#L3-L4)"
        );
    }

    // -- Formatter tests ----------------------------------------------------

    #[test]
    fn test_format_text_with_misses() {
        let text = sample_report(80.0, None).format(&TextFormatter);
        assert!(text.contains("Diff coverage: 60.0% (3/5 lines covered)"), "{text}");
        assert!(text.contains("src/foo.js  3/5 (60.0%)  missed: 5-6"), "{text}");
        assert!(text.contains("FAIL (threshold 80.0%)"), "{text}");
    }

    #[test]
    fn test_format_text_no_changes() {
        let changed = ChangedLineSet::new();
        let report = build_report(reconcile(&[], &changed), &changed, &[], 80.0, None);
        let text = report.format(&TextFormatter);
        assert!(text.contains("No added lines found in diff."));
        assert!(text.contains("PASS"));
    }

    #[test]
    fn test_format_text_nothing_instrumented() {
        let changed = ChangedLineSet::from([("README.md".to_string(), BTreeSet::from([2, 3]))]);
        let report = build_report(reconcile(&[], &changed), &changed, &[], 80.0, None);
        let text = report.format(&TextFormatter);
        assert!(text.contains("2 lines changed across 1 files, none are instrumented."), "{text}");
        assert!(text.contains("PASS"));
    }

    #[test]
    fn test_format_markdown_with_misses_linked() {
        let md = sample_report(50.0, Some("abc1234def")).format(&MarkdownFormatter);
        assert!(md.contains("✅ Diff Coverage: 60.0%"), "{md}");
        assert!(md.contains("(abc1234)"), "{md}");
        assert!(md.contains("| `src/foo.js` | 3 | 2 | 60% |"), "{md}");
        assert!(md.contains("[5-6](../blob/abc1234def/src/foo.js#L5-L6)"), "{md}");
    }

    #[test]
    fn test_format_markdown_all_covered() {
        let coverage = vec![FileCoverage {
            path: "a.js".to_string(),
            lines: vec![LineHit { line: 1, hit_count: 2 }],
        }];
        let changed = ChangedLineSet::from([("a.js".to_string(), BTreeSet::from([1]))]);
        let report = build_report(reconcile(&coverage, &changed), &changed, &coverage, 90.0, None);
        let md = report.format(&MarkdownFormatter);
        assert!(md.contains("Diff Coverage: 100.0%"));
        assert!(md.contains("All changed lines are covered!"));
    }

    #[test]
    fn test_format_json() {
        let json = sample_report(80.0, Some("abc")).format(&JsonFormatter);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["passed"], false);
        assert_eq!(value["coverage"]["total_lines"], 5);
        assert_eq!(value["coverage"]["file_results"]["src/foo.js"]["covered_lines"], 3);
        assert_eq!(value["missed_lines"]["src/foo.js"], serde_json::json!([5, 6]));
    }
}
