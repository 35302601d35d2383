//! Storage Module
//!
//! Seed data for tables declared with `source("file")`:
//! - [`DataProvider`]: caller-supplied access to source files
//! - [`csv`]: delimited-record parsing and seed row construction
//! - Error handling
//!
//! The compiler never touches the filesystem itself. A provider is either a
//! closure, [`DirectoryProvider`] rooted at a directory, or [`NoFiles`] for
//! programs without seed data.
//!
//! ```rust
//! use bucket::storage::{DataProvider, StorageResult};
//!
//! let provider = |file: &str| -> StorageResult<Vec<u8>> {
//!     assert_eq!(file, "users.csv");
//!     Ok(b"id,name\n1,a\n".to_vec())
//! };
//! assert_eq!(provider.contents("users.csv").unwrap().len(), 12);
//! ```

pub mod csv;
pub mod error;

use std::path::{Path, PathBuf};

pub use csv::{load_seed, parse_records, seed_rows, CsvOptions, SeedField, SeedRow};
pub use error::{StorageError, StorageResult};

/// Source of table seed files
pub trait DataProvider: Send + Sync {
    /// Raw bytes of `file`
    fn contents(&self, file: &str) -> StorageResult<Vec<u8>>;
}

impl<F> DataProvider for F
where
    F: Fn(&str) -> StorageResult<Vec<u8>> + Send + Sync,
{
    fn contents(&self, file: &str) -> StorageResult<Vec<u8>> {
        self(file)
    }
}

/// Provider for programs that declare no seed data; any request fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFiles;

impl DataProvider for NoFiles {
    fn contents(&self, file: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::NoProvider(file.to_string()))
    }
}

/// Reads source files relative to a root directory
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirectoryProvider {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataProvider for DirectoryProvider {
    fn contents(&self, file: &str) -> StorageResult<Vec<u8>> {
        let path = self.root.join(file);
        if !path.is_file() {
            return Err(StorageError::MissingFile(path.display().to_string()));
        }
        Ok(std::fs::read(path)?)
    }
}
