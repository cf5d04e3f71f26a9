use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Coverage file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported coverage format: {} (expected an lcov/.info or .json file)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Malformed {format} coverage data: {message}")]
    MalformedArtifact {
        format: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        Error::MalformedArtifact {
            format,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
