//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A content hash was not 64 hexadecimal characters.
    #[display("invalid hash: {_0:?}")]
    InvalidHash(#[error(not(source))] String),
    /// Reading or writing a persisted document failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A persisted document could not be (de)serialized.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Two books in one catalog share an id.
    #[display("duplicate book id: {_0}")]
    DuplicateId(#[error(not(source))] u64),
    /// No book with the given id exists.
    #[display("book not found: {_0}")]
    BookNotFound(#[error(not(source))] u64),
    /// A field edit was rejected by its validation rule.
    #[display("invalid value for {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
    /// The `git` executable could not be found on `PATH`.
    #[display("git executable not found")]
    GitNotFound,
    /// A git command exited unsuccessfully.
    #[display("git failed: {_0}")]
    Git(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
