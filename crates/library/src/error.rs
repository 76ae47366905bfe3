//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Each submodule raises its own
//! detailed kind; the public entry points wrap those in the categories below.

use derive_more::{Display, Error};
use shelf_catalog::CopySlot;
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A directory to scan or import from doesn't exist.
    #[display("directory not found: {}", _0.display())]
    DirectoryNotFound(#[error(not(source))] PathBuf),
    /// Another process holds the library lock.
    #[display("library is locked by another process: {}", _0.display())]
    AlreadyLocked(#[error(not(source))] PathBuf),
    /// The library lock couldn't be created.
    #[display("could not lock library")]
    Lock,
    #[display("issue with path generation from template")]
    Template,
    #[display("scan failed")]
    Scan,
    #[display("import failed")]
    Import,
    #[display("refresh failed")]
    Refresh,
    /// Loading or saving the catalog or the hash ledger failed.
    #[display("catalog persistence failed")]
    Catalog,
    /// A storage backend operation on the library root failed.
    #[display("storage operation failed")]
    Storage,
    /// Rebuilding the search index failed.
    #[display("search index failed")]
    Index,
    #[display("book not found: {_0}")]
    BookNotFound(#[error(not(source))] u64),
    #[display("book {id} has no {slot} copy")]
    NoSuchCopy { id: u64, slot: CopySlot },
    /// An edit was rejected by field validation.
    #[display("invalid edit")]
    Edit,
    /// No backup directory is configured.
    #[display("no backup directory configured")]
    NoBackupDir,
    #[display("backup failed")]
    Backup,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Catalog | Self::AlreadyLocked(_))
    }
}
