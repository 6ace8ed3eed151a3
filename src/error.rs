//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for clonesift operations
#[derive(Error, Debug)]
pub enum ClonesiftError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table parsing errors (malformed rows, unparseable cells)
    #[error("Parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    /// Invalid data errors (duplicate ids, frequencies outside [0,1], no timepoints)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Algorithm errors (broken lineage invariants, inconsistent assignments)
    #[error("Algorithm error: {message}")]
    Algorithm { message: String },

    /// Configuration errors (unknown clustering method, invalid thresholds)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },
}

/// Type alias for Results using ClonesiftError
pub type Result<T> = std::result::Result<T, ClonesiftError>;

impl ClonesiftError {
    /// Create a parse error with a message
    pub fn parse(row: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            row,
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an algorithm error
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// Convert csv errors to ClonesiftError, preserving the record position
// when the reader knows it.
impl From<csv::Error> for ClonesiftError {
    fn from(err: csv::Error) -> Self {
        let row = err
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or_default();
        Self::Parse {
            row,
            message: err.to_string(),
        }
    }
}
