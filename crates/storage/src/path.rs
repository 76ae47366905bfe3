//! Path validation.
//!
//! Every path handed to a backend is relative to that backend's root and must
//! never leave it.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validates a storage path and returns it in normalized form.
///
/// `.` segments, repeated separators and trailing separators are dropped and
/// `..` segments are resolved, as long as the resolution never climbs above
/// the root. Absolute paths are treated as relative to the root. Null bytes,
/// Windows prefixes and paths that normalize to nothing are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
/// assert!(validate_path("Le Guin, Ursula K/(1969) The Left Hand of Darkness.epub").is_ok());
/// assert!(validate_path("a/../book.epub").is_ok());
/// assert!(validate_path("../outside.epub").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("wrong/.././right//book.epub/").unwrap(),
///     Path::new("right/book.epub")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut segments = Vec::new();
    for component in original.components() {
        match component {
            // Null bytes survive Path::components() on Unix but truncate in
            // C-based syscalls.
            Component::Normal(s) if s.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(s) => segments.push(s),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if segments.is_empty() {
        exn::bail!(invalid());
    }
    Ok(segments.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Herbert, Frank/(1965) Dune.epub", "Herbert, Frank/(1965) Dune.epub")]
    #[case("a//b//c.epub", "a/b/c.epub")]
    #[case("a/./b/./c.epub", "a/b/c.epub")]
    #[case("/rooted/book.epub", "rooted/book.epub")]
    #[case("a/b/..", "a")]
    #[case("Author///", "Author")]
    fn test_normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("a\0b")]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    fn test_rejects(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
