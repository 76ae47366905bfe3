//! Finding a free spot for a file whose canonical path is taken.

use shelf_catalog::Collection;
use shelf_storage::BackendHandle;
use shelf_storage::error::Result;
use std::path::{Path, PathBuf};

/// Numbered variants tried after the canonical path itself.
const MAX_CONFLICT_DEPTH: usize = 5;

/// The first of `target`, `target (2)`, … `target (n)` that neither exists
/// in `backend` nor is referenced by a copy in `books`.
///
/// `own` is the path the file already occupies; it always counts as vacant so
/// that renaming a correctly named copy is a no-op. Returns `None` once every
/// variant is taken.
pub(crate) async fn vacant_path<C: Collection + ?Sized>(
    backend: &BackendHandle,
    books: &C,
    target: &Path,
    own: Option<&Path>,
) -> Result<Option<PathBuf>> {
    for attempt in 1..=MAX_CONFLICT_DEPTH + 1 {
        let path = numbered(target, attempt);
        if own == Some(path.as_path()) {
            return Ok(Some(path));
        }
        if books.find_by_path(&path).is_none() && !backend.exists(&path).await? {
            return Ok(Some(path));
        }
        tracing::debug!(path = %path.display(), "Canonical path taken");
    }
    Ok(None)
}

/// `Author/Title.epub` becomes `Author/Title (n).epub`; the first attempt is
/// the path itself.
fn numbered(target: &Path, attempt: usize) -> PathBuf {
    if attempt <= 1 {
        return target.to_path_buf();
    }
    let stem = target.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem} ({attempt}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({attempt})"),
    };
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shelf_catalog::{Book, Books, CopySlot, Hash, Metadata, PhysicalCopy};
    use shelf_storage::backend::MockBackend;
    use std::sync::Arc;

    #[rstest]
    #[case("A/Dune.epub", 1, "A/Dune.epub")]
    #[case("A/Dune.epub", 2, "A/Dune (2).epub")]
    #[case("A/Dune [retail].epub", 3, "A/Dune [retail] (3).epub")]
    #[case("Dune", 2, "Dune (2)")]
    fn test_numbered(#[case] target: &str, #[case] attempt: usize, #[case] expected: &str) {
        assert_eq!(numbered(Path::new(target), attempt), PathBuf::from(expected));
    }

    #[tokio::test]
    async fn test_skips_files_on_disk_and_in_catalog() {
        let backend: BackendHandle = Arc::new(MockBackend::with_files([("A/Dune.epub", b"stranger".to_vec())]));
        let mut books = Books::new();
        let copy = PhysicalCopy::new("A/Dune (2).epub", Hash::of("mine"));
        books.insert(Book::new(1, Metadata::new("Dune", ["A"]), CopySlot::NonRetail, copy)).unwrap();

        let path = vacant_path(&backend, &books, Path::new("A/Dune.epub"), None).await.unwrap();
        assert_eq!(path, Some(PathBuf::from("A/Dune (3).epub")));
    }

    #[tokio::test]
    async fn test_own_path_is_vacant() {
        let backend: BackendHandle = Arc::new(MockBackend::with_files([("A/Dune.epub", b"me".to_vec())]));
        let target = Path::new("A/Dune.epub");
        let path = vacant_path(&backend, &Books::new(), target, Some(target)).await.unwrap();
        assert_eq!(path.as_deref(), Some(target));
    }

    #[tokio::test]
    async fn test_gives_up() {
        let files = (1..=MAX_CONFLICT_DEPTH + 1).map(|n| (numbered(Path::new("Dune.epub"), n), b"x".to_vec()));
        let backend: BackendHandle = Arc::new(MockBackend::with_files(files));
        let path = vacant_path(&backend, &Books::new(), Path::new("Dune.epub"), None).await.unwrap();
        assert_eq!(path, None);
    }
}
