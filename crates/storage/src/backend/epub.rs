//! EPUB-filtered storage backend decorator.
//!
//! Wraps another backend and restricts all operations to `.epub` files.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{BackendHandle, StorageBackend, error::Result, file::FileInfo};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;

const EPUB_EXTENSION: &str = "epub";

/// Check if a path has the `.epub` extension (case-insensitive).
///
/// ```
/// use shelf_storage::backend::is_epub_path;
/// assert!(is_epub_path("Author/Title.epub"));
/// assert!(is_epub_path("SHOUTING.EPUB"));
/// assert!(!is_epub_path("Author/Title.pdf"));
/// assert!(!is_epub_path("epub"));
/// ```
pub fn is_epub_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EPUB_EXTENSION))
}

/// EPUB-filtered storage backend.
///
/// Listing silently drops other files; direct access to a non-EPUB path
/// returns [`ErrorKind::FilteredPath`].
#[derive(Clone)]
pub struct EpubOnlyBackend {
    inner: BackendHandle,
}
impl EpubOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    fn check(path: &Path) -> Result<()> {
        if !is_epub_path(path) {
            exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for EpubOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(self.inner.list_stream(prefix).filter(|item| {
            std::future::ready(match item {
                Ok(info) => is_epub_path(&info.path),
                Err(_) => true, // propagate errors
            })
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Self::check(path)?;
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Self::check(path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        Self::check(path)?;
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        Self::check(path)?;
        self.inner.delete(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Self::check(from)?;
        Self::check(to)?;
        self.inner.rename(from, to).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        Self::check(path)?;
        self.inner.stat(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Arc;

    fn backend() -> EpubOnlyBackend {
        EpubOnlyBackend::new(Arc::new(MockBackend::with_files([
            ("a/book.epub", Vec::from(*b"1")),
            ("a/BOOK2.EPUB", Vec::from(*b"2")),
            ("a/cover.jpg", Vec::from(*b"3")),
            ("notes.txt", Vec::from(*b"4")),
        ])))
    }

    #[tokio::test]
    async fn test_list_filters_non_epub() {
        let files = backend().list(None).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_epub_path(&f.path)));
    }

    #[tokio::test]
    async fn test_direct_access_rejected() {
        let backend = backend();
        let err = backend.read(Path::new("a/cover.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FilteredPath(_)));
        assert!(backend.read(Path::new("a/book.epub")).await.is_ok());
    }
}
