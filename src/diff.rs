/// Extract the lines a pull request added or modified from unified-diff
/// patch text. This is the "changed" side of diff coverage: which lines in
/// the new version of each file the change touched.
///
/// Also provides a [`PullRequestChangeSource`] trait that abstracts over
/// different ways to obtain per-file patches (stdin, git, GitHub API).
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::model::{normalize_path, ChangedLineSet};

// ---------------------------------------------------------------------------
// Changed files
// ---------------------------------------------------------------------------

/// Status of a file in a pull request, as reported by the hosting API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

/// One file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFile {
    #[serde(rename = "filename")]
    pub path: String,
    pub status: FileStatus,
    /// Unified-diff hunks for this file. Absent for binary files and for
    /// renames without content changes.
    #[serde(default)]
    pub patch: Option<String>,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, status: FileStatus, patch: Option<&str>) -> Self {
        Self {
            path: path.into(),
            status,
            patch: patch.map(str::to_owned),
        }
    }
}

/// Build the changed-line set for a pull request.
///
/// Removed files have no new version and are left out entirely; files
/// without a patch are present with an empty set.
pub fn changed_line_set(files: &[ChangedFile]) -> ChangedLineSet {
    let mut set = ChangedLineSet::new();
    for file in files {
        if file.status == FileStatus::Removed {
            continue;
        }
        let lines = file
            .patch
            .as_deref()
            .map(changed_lines)
            .unwrap_or_default();
        set.entry(normalize_path(&file.path))
            .or_default()
            .extend(lines);
    }
    set
}

/// Prepend a path prefix to every file in a changed-line set, for
/// coverage data recorded relative to a parent directory.
pub fn apply_path_prefix(changed: ChangedLineSet, prefix: &str) -> ChangedLineSet {
    let prefix = normalize_path(prefix);
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return changed;
    }
    changed
        .into_iter()
        .map(|(path, lines)| (format!("{prefix}/{path}"), lines))
        .collect()
}

// ---------------------------------------------------------------------------
// Patch parsing
// ---------------------------------------------------------------------------

/// `@@ -old_start[,old_count] +new_start[,new_count] @@`
static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)").expect("hunk header regex is valid")
});

/// Line numbers added in the new version of a file, given that file's
/// patch text.
pub fn changed_lines(patch: &str) -> BTreeSet<u32> {
    let (_, lines) = patch.lines().fold((0, BTreeSet::new()), step);
    lines
}

/// Advance the `(cursor, lines)` state over one line of patch text. The
/// cursor is the new-file line number the next line would occupy.
pub fn step((cursor, mut lines): (u32, BTreeSet<u32>), line: &str) -> (u32, BTreeSet<u32>) {
    if line.starts_with("@@") {
        // A header that doesn't parse keeps the previous cursor.
        let cursor = parse_hunk_header(line).unwrap_or(cursor);
        return (cursor, lines);
    }
    if line.starts_with('+') && !line.starts_with("+++") {
        if cursor > 0 {
            lines.insert(cursor);
        }
        return (cursor.saturating_add(1), lines);
    }
    if line.starts_with('-') || line.starts_with('\\') {
        // Removed line or "\ No newline at end of file".
        return (cursor, lines);
    }
    (cursor.saturating_add(1), lines)
}

/// Parse the new-file start line from a hunk header like "@@ -10,5 +20,8 @@".
fn parse_hunk_header(line: &str) -> Option<u32> {
    HUNK_HEADER.captures(line)?.get(1)?.as_str().parse().ok()
}

/// `@@ -old_start[,old_len] +new_start[,new_len] @@`; an omitted length is 1.
static HUNK_LENGTHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -\d+(?:,(\d+))? \+\d+(?:,(\d+))? @@").expect("hunk length regex is valid")
});

/// Old and new line counts of a hunk header, e.g. `(5, 8)` for
/// "@@ -10,5 +20,8 @@".
fn parse_hunk_lengths(line: &str) -> Option<(u32, u32)> {
    let caps = HUNK_LENGTHS.captures(line)?;
    let len = |i: usize| caps.get(i).map_or(Ok(1), |m| m.as_str().parse());
    Some((len(1).ok()?, len(2).ok()?))
}

// ---------------------------------------------------------------------------
// Multi-file unified diffs
// ---------------------------------------------------------------------------

/// A file section being collected from a multi-file diff.
#[derive(Default)]
struct Section {
    path: Option<String>,
    status: Option<FileStatus>,
    patch: String,
    in_hunks: bool,
    /// Old and new lines still expected by the current hunk.
    hunk_left: (u32, u32),
}

impl Section {
    /// Account for one line of hunk text, header included.
    fn hunk_line(&mut self, line: &str) {
        let (old, new) = self.hunk_left;
        self.hunk_left = if line.starts_with("@@") {
            parse_hunk_lengths(line).unwrap_or((0, 0))
        } else if line.starts_with('-') {
            (old.saturating_sub(1), new)
        } else if line.starts_with('+') {
            (old, new.saturating_sub(1))
        } else if line.starts_with('\\') {
            (old, new)
        } else {
            (old.saturating_sub(1), new.saturating_sub(1))
        };
    }

    fn hunk_done(&self) -> bool {
        self.hunk_left == (0, 0)
    }

    fn header(&mut self, line: &str) {
        if line.starts_with("new file mode") {
            self.status = Some(FileStatus::Added);
        } else if line.starts_with("deleted file mode") {
            self.status = Some(FileStatus::Removed);
        } else if let Some(to) = line.strip_prefix("rename to ") {
            self.status = Some(FileStatus::Renamed);
            self.path = Some(to.to_string());
        } else if line.starts_with("copy to ") {
            self.status = Some(FileStatus::Copied);
        } else if let Some(old) = line.strip_prefix("--- ") {
            if header_path(old).is_none() {
                self.status = Some(FileStatus::Added);
            } else if self.path.is_none() {
                self.path = header_path(old);
            }
        } else if let Some(new) = line.strip_prefix("+++ ") {
            match header_path(new) {
                Some(path) => self.path = Some(path),
                None => self.status = Some(FileStatus::Removed),
            }
        }
    }

    fn finish(self) -> Option<ChangedFile> {
        let path = self.path?;
        let status = self.status.unwrap_or(FileStatus::Modified);
        let patch = (!self.patch.is_empty()).then_some(self.patch);
        Some(ChangedFile {
            path,
            status,
            patch,
        })
    }
}

/// Path from a `---`/`+++` header, without the `a/`/`b/` prefix or a
/// trailing timestamp. `None` for `/dev/null`.
fn header_path(value: &str) -> Option<String> {
    let value = value.split('\t').next().unwrap_or(value).trim_end();
    if value == "/dev/null" {
        return None;
    }
    // Strip common VCS prefixes: "b/" (default git), "a/" (some tools).
    // Also handles --no-prefix diffs where no prefix is present.
    let path = value
        .strip_prefix("b/")
        .or_else(|| value.strip_prefix("a/"))
        .unwrap_or(value);
    Some(path.to_string())
}

/// Split a multi-file unified diff (e.g. `git diff` output) into one
/// [`ChangedFile`] per file, each carrying only its hunks.
pub fn split_unified_diff(diff_text: &str) -> Vec<ChangedFile> {
    let git_style = diff_text
        .lines()
        .any(|l| l.starts_with("diff --git "));

    let mut files = Vec::new();
    let mut current: Option<Section> = None;
    let mut lines = diff_text.lines().peekable();

    while let Some(line) = lines.next() {
        let new_section = if let Some(rest) = line.strip_prefix("diff --git ") {
            let path = rest.rsplit_once(" b/").map(|(_, b)| b.to_string());
            Some(Section {
                path,
                ..Default::default()
            })
        } else if !git_style
            && line.starts_with("--- ")
            && lines.peek().is_some_and(|next| next.starts_with("+++ "))
            && current.as_ref().map_or(true, |s| s.in_hunks && s.hunk_done())
        {
            Some(Section::default())
        } else {
            None
        };

        if let Some(section) = new_section {
            files.extend(current.replace(section).and_then(Section::finish));
            if git_style {
                continue;
            }
        }

        let Some(section) = current.as_mut() else {
            continue;
        };
        if !section.in_hunks && line.starts_with("@@") {
            section.in_hunks = true;
        }
        if section.in_hunks {
            section.hunk_line(line);
            section.patch.push_str(line);
            section.patch.push('\n');
        } else {
            section.header(line);
        }
    }

    files.extend(current.and_then(Section::finish));
    files
}

// ---------------------------------------------------------------------------
// Change sources
// ---------------------------------------------------------------------------

/// A source for the files changed by a pull request.
pub trait PullRequestChangeSource {
    /// Fetch every changed file with its status and patch.
    fn changed_files(&self) -> Result<Vec<ChangedFile>>;

    /// Get the head commit SHA, if available.
    fn sha(&self) -> Option<&str> {
        None
    }
}

/// Changed files that are already in memory.
pub struct StaticChanges(pub Vec<ChangedFile>);

impl PullRequestChangeSource for StaticChanges {
    fn changed_files(&self) -> Result<Vec<ChangedFile>> {
        Ok(self.0.clone())
    }
}

/// A multi-file unified diff obtained from stdin, a file, or git.
pub struct UnifiedDiff {
    text: String,
}

impl UnifiedDiff {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read the diff from stdin.
    pub fn from_stdin() -> Result<Self> {
        let text =
            std::io::read_to_string(std::io::stdin()).context("Failed to read diff from stdin")?;
        Ok(Self::new(text))
    }

    /// Read the diff from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read diff from {}", path.display()))?;
        Ok(Self::new(text))
    }

    /// Run `git diff <args>` (e.g. "origin/main...HEAD").
    pub fn from_git(args: &str) -> Result<Self> {
        let diff_args: Vec<&str> = args.split_whitespace().collect();
        tracing::info!(args, "running git diff");
        let output = Command::new("git")
            .arg("diff")
            .args(&diff_args)
            .output()
            .context("Failed to run git diff")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git diff failed: {stderr}");
        }

        let text = String::from_utf8(output.stdout).context("git diff output not valid UTF-8")?;
        Ok(Self::new(text))
    }
}

impl PullRequestChangeSource for UnifiedDiff {
    fn changed_files(&self) -> Result<Vec<ChangedFile>> {
        Ok(split_unified_diff(&self.text))
    }
}
