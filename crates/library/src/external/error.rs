//! Error types for the [`external`](super) collaborators.

use derive_more::{Display, Error};

/// An error from an external collaborator.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for external collaborators.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container couldn't be parsed as an EPUB.
    #[display("not a readable EPUB: {_0}")]
    Unreadable(#[error(not(source))] String),
    /// The container carries no usable title.
    #[display("EPUB has no title")]
    MissingTitle,
    /// Remote lookup is not available.
    #[display("online lookup unavailable")]
    Unavailable,
    /// The remote service failed or returned nothing usable.
    #[display("online lookup failed: {_0}")]
    Lookup(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }
}
