//! Errors raised while loading a mutation-call file.

use crate::hgvs::HgvsError;
use crate::sort::SortError;
use std::io;
use thiserror::Error;

/// Errors that can occur while reading, mapping, sorting or merging records.
///
/// All of them are fatal to the load that raised them.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Expecting {expected} columns, but got {found}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("Required column missing from header: {0}")]
    MissingColumn(String),

    #[error("Malformed row at line {line}: expected {expected} fields, got {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Invalid start position at line {line}: '{value}'")]
    InvalidPosition { line: u64, value: String },

    #[error(transparent)]
    Hgvs(#[from] HgvsError),

    #[error("Sort error: {0}")]
    Sort(#[from] SortError),

    #[error("Malformed spill row for '{id}': {message}")]
    SpillFormat { id: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
