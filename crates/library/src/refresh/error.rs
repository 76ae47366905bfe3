//! Error types for the [`refresh`](super) module.

use derive_more::{Display, Error};

/// A refresh error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for refresh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a refresh failure.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage backend operation (exists, rename) failed.
    Storage,
    /// The [`PathGenerator`](crate::PathGenerator) could not render a path.
    Template,
    /// Every numbered variant of the canonical path is already taken.
    Conflict,
    /// The catalog couldn't be saved.
    Catalog,
    /// The book or copy to rename isn't in the catalog.
    Missing,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Catalog)
    }
}
