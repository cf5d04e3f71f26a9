/// Detection of the coverage format from the artifact's file name.
///
/// Strategy:
///   1. A name containing "lcov", or an `.info`/`.lcov` extension, is LCOV
///   2. A `.json` extension is Istanbul
///   3. Anything else is unsupported (the caller may pass an override)
use std::path::Path;

use crate::error::Error;

/// Supported coverage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One `DA:` record per instrumented line.
    Lcov,
    /// Statement and branch maps with hit counts (`coverage-final.json`).
    Istanbul,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Lcov => "lcov",
            Format::Istanbul => "istanbul",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lcov" => Ok(Format::Lcov),
            "istanbul" | "json" => Ok(Format::Istanbul),
            _ => Err(format!("Unknown format: '{s}'. Supported: lcov, istanbul")),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the coverage format from the file name alone.
pub fn detect_format(path: &Path) -> Option<Format> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if name.contains("lcov") {
        return Some(Format::Lcov);
    }

    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "info" | "lcov" => Some(Format::Lcov),
        "json" => Some(Format::Istanbul),
        _ => None,
    }
}

/// Like [`detect_format`], but an unrecognized name is an error.
pub fn require_format(path: &Path) -> crate::error::Result<Format> {
    detect_format(path).ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))
}
