//! Error types for the [`import`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Policy rejections aren't errors; they come back as an
//! [`Outcome`](super::Outcome).

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An import error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an import failure.
///
/// Every variant aborts the current candidate only.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading the candidate or writing/deleting a library file failed.
    Storage,
    /// The file's content no longer matches the hash it was scanned with.
    #[display("changed since it was scanned: {}", _0.display())]
    Changed(#[error(not(source))] PathBuf),
    /// The [`PathGenerator`](crate::PathGenerator) could not render a path.
    Template,
    /// Every numbered variant of the canonical path is already taken.
    Conflict,
    /// The catalog couldn't be saved; the in-memory collection was rolled
    /// back.
    Catalog,
    /// The resolved book disappeared between lookup and mutation.
    Inconsistent,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Catalog)
    }
}
