//! Command handler functions for the prcov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::collections::BTreeSet;
use std::fmt::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::diff::{self, PullRequestChangeSource};
use crate::model::FileCoverage;
use crate::normalize::Normalizer;
use crate::reconcile::reconcile;
use crate::report::{
    self, DiffCoverageReport, JsonFormatter, MarkdownFormatter, ReportFormatter, TextFormatter,
    Verdict,
};

/// Output style for the `check` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
    Json,
}

impl Style {
    pub fn formatter(self) -> &'static dyn ReportFormatter {
        match self {
            Style::Text => &TextFormatter,
            Style::Markdown => &MarkdownFormatter,
            Style::Json => &JsonFormatter,
        }
    }
}

/// Settings for [`cmd_check`].
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Minimum passing diff coverage, as a percentage.
    pub threshold: f64,
    /// Prefix prepended to diff paths before matching coverage paths.
    pub path_prefix: Option<String>,
    pub style: Style,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            path_prefix: None,
            style: Style::Text,
        }
    }
}

/// Output of [`cmd_check`]: the report, formatted in the requested style.
#[derive(Debug)]
pub struct CheckOutcome {
    pub output: String,
    pub report: DiffCoverageReport,
}

impl CheckOutcome {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.report.verdict()
    }
}

/// Parse the coverage artifact at `coverage_path`, then run [`check`].
pub fn cmd_check(
    normalizer: &Normalizer,
    coverage_path: &std::path::Path,
    source: &dyn PullRequestChangeSource,
    options: &CheckOptions,
) -> Result<CheckOutcome> {
    let coverage = normalizer
        .parse(coverage_path)
        .with_context(|| format!("Failed to load coverage from {}", coverage_path.display()))?;
    check(&coverage, source, options)
}

/// Core diff-coverage logic over already-parsed coverage data.
pub fn check(
    coverage: &[FileCoverage],
    source: &dyn PullRequestChangeSource,
    options: &CheckOptions,
) -> Result<CheckOutcome> {
    let files = source.changed_files()?;
    let mut changed = diff::changed_line_set(&files);
    if let Some(prefix) = options.path_prefix.as_deref() {
        changed = diff::apply_path_prefix(changed, prefix);
    }

    let result = reconcile(coverage, &changed);
    tracing::info!(
        covered = result.covered_lines,
        total = result.total_lines,
        percent = result.coverage_percent,
        "diff coverage computed"
    );

    let report = report::build_report(result, &changed, coverage, options.threshold, source.sha());
    Ok(CheckOutcome {
        output: report.format(options.style.formatter()),
        report,
    })
}

/// List the changed lines per file as compact ranges.
pub fn cmd_changed(source: &dyn PullRequestChangeSource) -> Result<String> {
    let files = source.changed_files()?;
    let changed = diff::changed_line_set(&files);

    if changed.is_empty() {
        return Ok("No changed files found in diff.\n".to_string());
    }

    let mut out = String::new();
    for (path, lines) in &changed {
        let ranges = consecutive_ranges(lines)
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        if ranges.is_empty() {
            writeln!(out, "{path}: (no added lines)").unwrap();
        } else {
            writeln!(out, "{path}: {ranges}").unwrap();
        }
    }
    Ok(out)
}

/// Runs of consecutive line numbers as `(start, end)` pairs.
fn consecutive_ranges(lines: &BTreeSet<u32>) -> Vec<(u32, u32)> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(line) => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
}
