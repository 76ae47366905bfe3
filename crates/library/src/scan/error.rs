//! Error types for the [`scan`](super) module.

use derive_more::{Display, Error};

/// A scan error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a scan failure.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading a candidate from the storage backend failed.
    Storage,
    /// The blocking hashing task panicked or was cancelled.
    Hash,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
