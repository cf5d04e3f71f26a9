use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::detect::{require_format, Format};
use crate::error::{Error, Result};
use crate::model::FileCoverage;
use crate::parsers::istanbul::IstanbulParser;
use crate::parsers::lcov::LcovParser;
use crate::parsers::Parser;

/// Read a coverage artifact, detecting its format from the file name, and
/// return the canonical per-file line hits.
pub fn parse(path: &Path) -> Result<Vec<FileCoverage>> {
    Normalizer::default().parse(path)
}

/// Options for turning a coverage artifact into [`FileCoverage`] entries.
#[derive(Debug, Default, Clone)]
pub struct Normalizer {
    /// Skip detection and parse as this format.
    pub format: Option<Format>,
    /// Directory stripped from absolute Istanbul paths. Defaults to the
    /// process working directory.
    pub root: Option<PathBuf>,
}

impl Normalizer {
    pub fn with_format(mut self, format: Option<Format>) -> Self {
        self.format = format;
        self
    }

    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    /// Parse the artifact at `path`. Fails on a missing file, an
    /// unrecognized name, or content that doesn't parse.
    pub fn parse(&self, path: &Path) -> Result<Vec<FileCoverage>> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let format = match self.format {
            Some(format) => format,
            None => require_format(path)?,
        };
        let mut reader = BufReader::new(file);

        let files = match format {
            Format::Lcov => LcovParser.parse_reader(&mut reader)?,
            Format::Istanbul => self.istanbul().parse_reader(&mut reader)?,
        };

        tracing::info!(
            path = %path.display(),
            %format,
            files = files.len(),
            "parsed coverage artifact"
        );
        Ok(files)
    }

    fn istanbul(&self) -> IstanbulParser {
        let root = self
            .root
            .clone()
            .or_else(|| std::env::current_dir().ok());
        IstanbulParser { root }
    }
}
