//! Tile persistence errors.

use std::path::PathBuf;
use thiserror::Error;
use tile_common::CacheError;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Tile {path} is {actual} bytes, below the {minimum} byte minimum")]
    TooSmall {
        path: PathBuf,
        actual: u64,
        minimum: u64,
        /// Where the rejected bytes were moved, if the move succeeded.
        quarantined: Option<PathBuf>,
    },

    #[error("Failed to write tile {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },
}

impl SaveError {
    /// Short reason string for failure records.
    pub fn reason(&self) -> &'static str {
        match self {
            SaveError::TooSmall { .. } => "too_small",
            SaveError::WriteFailed { .. } => "write_failed",
        }
    }
}

impl From<SaveError> for CacheError {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::TooSmall { actual, minimum, .. } => CacheError::TileTooSmall { actual, minimum },
            SaveError::WriteFailed { .. } => CacheError::Persistence(err.to_string()),
        }
    }
}
