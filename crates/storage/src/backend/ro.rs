//! Read-only storage backend decorator.
//!
//! Scanned directories are never modified: candidates are copied *into* the
//! library, the originals stay where they are. Wrapping the scan source in
//! [`ReadOnlyBackend`] makes that hold even if a caller gets it wrong.

use async_trait::async_trait;
use std::path::Path;

use crate::{BackendHandle, StorageBackend, backend::FileInfoStream, error::Result, file::FileInfo};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event).
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(backend = self.name(), path = %path.display(), bytes = data.len(), "Skipping write on read-only backend");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(backend = self.name(), path = %path.display(), "Skipping delete on read-only backend");
        Ok(())
    }

    async fn rename(&self, from: &Path, _to: &Path) -> Result<()> {
        tracing::info!(backend = self.name(), path = %from.display(), "Skipping rename on read-only backend");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_writes_are_dropped() {
        let inner: BackendHandle = Arc::new(MockBackend::with_files([("book.epub", Vec::from(*b"original"))]));
        let backend = ReadOnlyBackend::new(inner.clone());
        backend.write(Path::new("book.epub"), b"changed").await.unwrap();
        backend.write(Path::new("other.epub"), b"new").await.unwrap();
        backend.delete(Path::new("book.epub")).await.unwrap();
        backend.rename(Path::new("book.epub"), Path::new("moved.epub")).await.unwrap();
        assert_eq!(inner.read(Path::new("book.epub")).await.unwrap(), b"original");
        assert!(!inner.exists(Path::new("other.epub")).await.unwrap());
        assert!(!inner.exists(Path::new("moved.epub")).await.unwrap());
    }
}
