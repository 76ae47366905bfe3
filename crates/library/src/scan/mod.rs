//! Discovering EPUB files in a directory and classifying them against what
//! the library has already seen.
//!
//! Scanning never writes: the directory is wrapped read-only and restricted
//! to `.epub` files before anything is listed.

mod candidates;
pub(crate) mod error;
mod stream;

pub use self::candidates::{Candidates, EpubCandidate};
pub use self::stream::{ScanEvent, scan_stream};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use exn::ResultExt;
use futures::TryStreamExt;
use shelf_catalog::{Collection, HashLedger};
use shelf_storage::BackendHandle;
use shelf_storage::backend::{EpubOnlyBackend, LocalBackend, ReadOnlyBackend};
use shelf_storage::error::ErrorKind as StorageErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Wraps the directory at `root` as a read-only, EPUB-only backend.
///
/// Fails with [`DirectoryNotFound`](LibraryErrorKind::DirectoryNotFound) if
/// `root` doesn't exist or isn't a directory.
pub fn source_backend(root: impl AsRef<Path>) -> LibraryResult<BackendHandle> {
    let root = root.as_ref();
    let absolute = std::path::absolute(root).or_raise(|| LibraryErrorKind::DirectoryNotFound(root.to_path_buf()))?;
    let local = match LocalBackend::open("incoming", &absolute) {
        Ok(local) => local,
        Err(e) if matches!(&*e, StorageErrorKind::DirectoryNotFound(_)) => {
            return Err(e.raise(LibraryErrorKind::DirectoryNotFound(root.to_path_buf())));
        },
        Err(e) => return Err(e.raise(LibraryErrorKind::Storage)),
    };
    let read_only: BackendHandle = Arc::new(ReadOnlyBackend::new(Arc::new(local)));
    Ok(Arc::new(EpubOnlyBackend::new(read_only)))
}

/// Scans the directory at `root`, hashing every EPUB below it.
#[instrument(skip(root, ledger, collection), fields(root = %root.as_ref().display()))]
pub async fn scan<C: Collection + ?Sized>(
    root: impl AsRef<Path>,
    ledger: &HashLedger,
    collection: &C,
    workers: usize,
) -> LibraryResult<Candidates> {
    let source = source_backend(root)?;
    scan_backend(&source, ledger, collection, workers).await
}

/// Scans everything `source` lists, collecting the hashed candidates.
pub async fn scan_backend<C: Collection + ?Sized>(
    source: &BackendHandle,
    ledger: &HashLedger,
    collection: &C,
    workers: usize,
) -> LibraryResult<Candidates> {
    let mut found = Vec::new();
    let mut skipped = 0usize;
    let mut events = std::pin::pin!(scan_stream(source, ledger, collection, workers));
    while let Some(event) = events.try_next().await? {
        match event {
            ScanEvent::DiscoveryComplete(total) => tracing::debug!(total, "Discovered candidates"),
            ScanEvent::Hashed(candidate) => found.push(candidate),
            ScanEvent::Skipped { .. } => skipped += 1,
            ScanEvent::Started | ScanEvent::Complete => {},
        }
    }
    let candidates = Candidates::new(found);
    tracing::info!(
        backend = source.name(),
        total = candidates.len(),
        new = candidates.new_files().count(),
        missing = candidates.missing().count(),
        skipped,
        "Scan complete"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_catalog::{Book, Books, CopySlot, Hash, Metadata, PhysicalCopy};
    use shelf_storage::backend::MockBackend;
    use std::path::PathBuf;

    fn source(files: &[(&str, &str)]) -> BackendHandle {
        Arc::new(MockBackend::with_files(files.iter().map(|(p, b)| (PathBuf::from(p), b.as_bytes().to_vec()))))
    }

    #[tokio::test]
    async fn test_classifies_against_ledger_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = HashLedger::new(dir.path().join("hashes"));
        ledger.insert(Hash::of("held"));
        ledger.insert(Hash::of("gone"));
        let mut books = Books::new();
        let copy = PhysicalCopy::new("A/Held.epub", Hash::of("held"));
        books.insert(Book::new(1, Metadata::new("Held", ["A"]), CopySlot::NonRetail, copy)).unwrap();

        let source = source(&[("new.epub", "new"), ("held.epub", "held"), ("gone.epub", "gone")]);
        let candidates = scan_backend(&source, &ledger, &books, 2).await.unwrap();

        assert_eq!(candidates.len(), 3);
        let new: Vec<_> = candidates.new_files().map(|c| c.path.clone()).collect();
        let missing: Vec<_> = candidates.missing().map(|c| c.path.clone()).collect();
        assert_eq!(new, vec![PathBuf::from("new.epub")]);
        assert_eq!(missing, vec![PathBuf::from("gone.epub")]);
        assert_eq!(candidates.importable().count(), 2);
    }

    #[tokio::test]
    async fn test_stream_event_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::new(dir.path().join("hashes"));
        let source = source(&[("a.epub", "a"), ("b.epub", "b"), ("c.epub", "c")]);
        let events: Vec<_> = scan_stream(&source, &ledger, &Books::new(), 1).try_collect().await.unwrap();
        assert!(matches!(events.first(), Some(ScanEvent::Started)));
        assert!(matches!(events.get(1), Some(ScanEvent::DiscoveryComplete(3))));
        assert_eq!(events.iter().filter(|e| matches!(e, ScanEvent::Hashed(_))).count(), 3);
        assert!(matches!(events.last(), Some(ScanEvent::Complete)));
    }

    #[tokio::test]
    async fn test_scan_only_sees_epubs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/book.epub"), b"book").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"notes").unwrap();
        let ledger = HashLedger::new(dir.path().join("hashes"));
        let candidates = scan(dir.path(), &ledger, &Books::new(), 4).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates.all()[0].path, PathBuf::from("sub/book.epub"));
        assert!(candidates.all()[0].is_new());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::new(dir.path().join("hashes"));
        let err = scan(dir.path().join("nope"), &ledger, &Books::new(), 4).await.unwrap_err();
        assert!(matches!(&*err, LibraryErrorKind::DirectoryNotFound(_)));
    }
}
