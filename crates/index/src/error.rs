//! Search Index Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A search index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading or writing the persisted index failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The persisted index could not be (de)serialized.
    #[display("corrupt index: {_0}")]
    Corrupt(#[error(not(source))] &'static str),
    /// The index implementation rejected an operation.
    #[display("index backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// An incremental update failed and so did the rebuild.
    #[display("index rebuild failed")]
    RebuildFailed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend(_))
    }
}
