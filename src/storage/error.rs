//! Seed Data Error Types

use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Seed ingestion errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Source file is not UTF-8
    #[error("Invalid UTF-8 in source file: {0}")]
    Utf8(#[from] FromUtf8Error),

    /// A table names a source file but no provider was supplied
    #[error("Pass in a function that returns contents of a file (requested '{0}')")]
    NoProvider(String),

    /// Provider does not know the file
    #[error("Source file not found: {0}")]
    MissingFile(String),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type for seed ingestion
pub type StorageResult<T> = Result<T, StorageError>;
