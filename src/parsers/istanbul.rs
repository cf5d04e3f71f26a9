/// Parser for Istanbul / NYC `coverage-final.json` format.
///
/// Reference: https://github.com/istanbuljs/istanbuljs
///
/// The format is a JSON object keyed by file path. Each value contains:
///   - `statementMap`: `{ "0": { "start": { "line": 1, "column": 0 }, "end": { "line": 3, "column": 1 } }, ... }`
///   - `s`:            `{ "0": 5, "1": 0, ... }` — hit counts per statement
///   - `branchMap`:    `{ "0": { "line": 2, "loc": ..., "type": "if", "locations": [...] }, ... }`
///   - `b`:            `{ "0": [5, 0], ... }` — hit counts per branch arm
///
/// Some tools also write a `"total"` summary entry next to the files; it
/// is skipped.
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::de::{Error as _, IgnoredAny};
use serde::Deserialize;

use super::Parser;
use crate::error::{Error, Result};
use crate::model::{normalize_path, FileCoverage};

const FORMAT: &str = "istanbul";

/// Key of the aggregate summary pseudo-entry.
const TOTAL_KEY: &str = "total";

/// Widest line span a single statement may cover.
const MAX_STATEMENT_SPAN: u32 = 1_000_000;

/// Istanbul / NYC JSON parser.
///
/// Istanbul records absolute paths; `root` is stripped from the front of
/// each one to make it repo-relative.
#[derive(Debug, Default, Clone)]
pub struct IstanbulParser {
    pub root: Option<PathBuf>,
}

impl IstanbulParser {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl Parser for IstanbulParser {
    fn parse_reader(&self, reader: &mut dyn BufRead) -> Result<Vec<FileCoverage>> {
        parse_reader(reader, self.root.as_deref())
    }
}

/// Parse Istanbul JSON from raw bytes, stripping the process working
/// directory from file paths.
pub fn parse(input: &[u8]) -> Result<Vec<FileCoverage>> {
    let root = std::env::current_dir().ok();
    parse_reader(&mut &*input, root.as_deref())
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "statementMap", default)]
    statement_map: BTreeMap<String, Location>,
    #[serde(default)]
    s: HashMap<String, u64>,
    #[serde(rename = "branchMap", default)]
    branch_map: BTreeMap<String, BranchInfo>,
    #[serde(default)]
    b: HashMap<String, Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Position {
    line: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    #[serde(default)]
    start: Position,
    #[serde(default)]
    end: Position,
}

#[derive(Debug, Deserialize)]
struct BranchInfo {
    line: Option<u32>,
    loc: Option<Location>,
    #[serde(default)]
    locations: Vec<Location>,
}

impl BranchInfo {
    /// `line` when present, otherwise the start of `loc`, otherwise the
    /// start of the first arm.
    fn line(&self) -> Option<u32> {
        self.line
            .or_else(|| self.loc.as_ref().and_then(|l| l.start.line))
            .or_else(|| self.locations.first().and_then(|l| l.start.line))
    }
}

/// Deserializes the top-level JSON object entry by entry using a serde
/// `MapAccess` visitor so only one file entry is in memory at a time.
fn parse_reader(reader: &mut dyn BufRead, root: Option<&Path>) -> Result<Vec<FileCoverage>> {
    // Peek at the first bytes to handle empty input.
    let buf = reader.fill_buf()?;
    if buf.is_empty() || buf.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let root = root.map(|r| r.to_string_lossy().into_owned());
    let mut deser = serde_json::Deserializer::from_reader(reader);
    let visitor = IstanbulVisitor {
        root: root.as_deref(),
    };
    let mut files = serde::Deserializer::deserialize_map(&mut deser, visitor)
        .map_err(|e| Error::malformed(FORMAT, e.to_string()))?;
    deser
        .end()
        .map_err(|e| Error::malformed(FORMAT, e.to_string()))?;

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Serde visitor that iterates over the top-level `{ path: entry }` map,
/// converting each entry into a `FileCoverage` before moving on.
struct IstanbulVisitor<'a> {
    root: Option<&'a str>,
}

impl<'de> serde::de::Visitor<'de> for IstanbulVisitor<'_> {
    type Value = Vec<FileCoverage>;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("an Istanbul JSON object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut files = Vec::new();
        while let Some(file_path) = map.next_key::<String>()? {
            if file_path == TOTAL_KEY {
                map.next_value::<IgnoredAny>()?;
                continue;
            }
            let entry: FileEntry = map.next_value()?;
            let hits = line_hits(&entry)
                .map_err(|msg| A::Error::custom(format!("{file_path}: {msg}")))?;
            let path = relative_path(&file_path, self.root);
            files.push(FileCoverage::from_hits(path, hits));
        }
        Ok(files)
    }
}

/// Expand statements and branches into per-line hit counts.
///
/// Every line spanned by a statement gets the statement's count; a line
/// spanned by several statements keeps the largest. A branch with any arm
/// taken marks its line as hit once, but only when no statement already
/// recorded a hit there.
///
/// A statement ending before it starts, or spanning more than
/// [`MAX_STATEMENT_SPAN`] lines, is rejected.
fn line_hits(entry: &FileEntry) -> std::result::Result<BTreeMap<u32, u64>, String> {
    let mut hits: BTreeMap<u32, u64> = BTreeMap::new();

    for (idx, loc) in &entry.statement_map {
        let Some(start) = loc.start.line else {
            continue;
        };
        let end = loc.end.line.unwrap_or(start);
        if end < start {
            return Err(format!("statement {idx} ends at line {end} before it starts at {start}"));
        }
        if end - start > MAX_STATEMENT_SPAN {
            return Err(format!("statement {idx} spans lines {start}-{end}"));
        }
        let count = entry.s.get(idx).copied().unwrap_or(0);

        for line in (start..=end).filter(|&l| l > 0) {
            hits.entry(line)
                .and_modify(|e| *e = (*e).max(count))
                .or_insert(count);
        }
    }

    for (idx, branch) in &entry.branch_map {
        let Some(line) = branch.line().filter(|&l| l > 0) else {
            continue;
        };
        let taken = entry
            .b
            .get(idx)
            .is_some_and(|arms| arms.iter().any(|&c| c > 0));
        if !taken {
            continue;
        }
        let hit = hits.entry(line).or_insert(0);
        if *hit == 0 {
            *hit = 1;
        }
    }

    Ok(hits)
}

/// Strip `root` from the front of an Istanbul path, then any leading
/// separators. Paths outside `root` are only normalized.
fn relative_path(path: &str, root: Option<&str>) -> String {
    let stripped = root
        .map(|r| r.trim_end_matches(['/', '\\']))
        .filter(|r| !r.is_empty())
        .and_then(|r| path.strip_prefix(r))
        .filter(|rest| rest.is_empty() || rest.starts_with(['/', '\\']))
        .unwrap_or(path);
    normalize_path(stripped.trim_start_matches(['/', '\\']))
}
