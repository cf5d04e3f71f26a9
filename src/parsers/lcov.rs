/// Parser for the LCOV `.info` format.
///
/// Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
///
/// Records used here:
///   SF:<path to source file>
///   DA:<line number>,<execution count>[,<checksum>]
///   end_of_record
///
/// Everything else (TN, FN, FNDA, BRDA, LF, LH, ...) describes data the
/// per-line model does not carry and is skipped.
use std::collections::BTreeMap;
use std::io::BufRead;

use super::Parser;
use crate::error::{Error, Result};
use crate::model::{normalize_path, FileCoverage};

const FORMAT: &str = "lcov";

/// LCOV format parser.
pub struct LcovParser;

impl Parser for LcovParser {
    fn parse_reader(&self, reader: &mut dyn BufRead) -> Result<Vec<FileCoverage>> {
        parse_reader(reader)
    }
}

/// Parse LCOV coverage data from raw bytes.
pub fn parse(input: &[u8]) -> Result<Vec<FileCoverage>> {
    LcovParser.parse(input)
}

/// Reads line-by-line so the full tracefile need not be in memory at
/// once. Records for the same source file are merged.
fn parse_reader(reader: &mut dyn BufRead) -> Result<Vec<FileCoverage>> {
    let mut files: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();
    let mut current: Option<String> = None;

    let mut raw_line = String::new();
    let mut line_no = 0usize;
    loop {
        raw_line.clear();
        let n = reader.read_line(&mut raw_line).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                Error::malformed(FORMAT, format!("line {}: invalid UTF-8", line_no + 1))
            } else {
                Error::Io(e)
            }
        })?;
        if n == 0 {
            break; // EOF
        }
        line_no += 1;

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "end_of_record" {
            current = None;
            continue;
        }

        let (tag, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };

        match tag {
            "SF" => {
                let path = normalize_path(value);
                files.entry(path.clone()).or_default();
                current = Some(path);
            }
            "DA" => {
                // Some instrumenters use negative counts (e.g., -1) to
                // indicate non-instrumentable lines. Those are skipped.
                let Some(path) = current.as_ref() else {
                    continue;
                };
                let Some((line_number, count)) = parse_da(value) else {
                    return Err(Error::malformed(
                        FORMAT,
                        format!("line {line_no}: invalid DA record '{value}'"),
                    ));
                };
                if count < 0 {
                    continue;
                }
                if let Some(hits) = files.get_mut(path) {
                    let entry = hits.entry(line_number).or_insert(0);
                    *entry = entry.saturating_add(count as u64);
                }
            }
            _ => {}
        }
    }

    Ok(files
        .into_iter()
        .map(|(path, hits)| FileCoverage::from_hits(path, hits))
        .collect())
}

/// `DA:<line>,<count>[,<checksum>]` → `(line, count)`. Line numbers are
/// 1-based.
fn parse_da(value: &str) -> Option<(u32, i64)> {
    let mut parts = value.splitn(3, ',');
    let line_number = parts.next()?.trim().parse::<u32>().ok()?;
    let count = parts.next()?.trim().parse::<i64>().ok()?;
    if line_number == 0 {
        return None;
    }
    Some((line_number, count))
}
