pub mod istanbul;
pub mod lcov;

use std::io::BufRead;

use crate::error::Result;
use crate::model::FileCoverage;

/// Every format parser implements this trait.
pub trait Parser {
    /// Parse a coverage artifact into the canonical per-line model.
    fn parse_reader(&self, reader: &mut dyn BufRead) -> Result<Vec<FileCoverage>>;

    /// Parse an in-memory artifact.
    fn parse(&self, input: &[u8]) -> Result<Vec<FileCoverage>> {
        self.parse_reader(&mut &*input)
    }
}
