//! Whole-document persistence of the catalog.

use crate::collection::{Books, Collection};
use crate::error::{ErrorKind, Result};
use crate::models::Book;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// The catalog file: every book, plus the highest id ever handed out so that
/// ids of removed books stay retired across sessions.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    last_id: u64,
    books: Vec<Book>,
}

/// Catalogs written before `last_id` was recorded are a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Document(Document),
    Bare(Vec<Book>),
}

/// Write `bytes` to a sibling temporary file, then rename it over `path`, so
/// readers never observe a half-written document.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.or_raise(|| ErrorKind::Io(tmp.clone()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).or_raise(|| ErrorKind::Io(path.to_path_buf()));
    }
    Ok(())
}

/// The catalog document on disk, as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the catalog. A missing file is an empty catalog.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Books> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No catalog on disk yet; starting empty");
                return Ok(Books::new());
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io(self.path.clone())),
        };
        let stored: Stored = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData("catalog"))?;
        let books = match stored {
            Stored::Document(Document { last_id, books }) => Books::from_vec(books)?.with_last_id(last_id),
            Stored::Bare(books) => Books::from_vec(books)?,
        };
        tracing::debug!(books = books.len(), "Loaded catalog");
        Ok(books)
    }

    /// Serialize `books` and write them, returning whether the file changed.
    ///
    /// The serialized bytes are compared with what is on disk; identical
    /// content is not rewritten.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self, books: &Books) -> Result<bool> {
        let document = Document { last_id: books.last_id(), books: books.to_vec() };
        let mut bytes = serde_json::to_vec_pretty(&document).or_raise(|| ErrorKind::InvalidData("catalog"))?;
        bytes.push(b'\n');
        match tokio::fs::read(&self.path).await {
            Ok(existing) if existing == bytes => {
                tracing::trace!("Catalog unchanged; skipping write");
                return Ok(false);
            },
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io(self.path.clone())),
        }
        write_atomically(&self.path, &bytes).await?;
        tracing::debug!(books = books.len(), "Saved catalog");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::models::{CopySlot, Metadata, PhysicalCopy, Progress};

    fn books() -> Books {
        let copy = PhysicalCopy::new("Frank Herbert/Dune [retail].epub", Hash::of(b"dune"));
        Books::from_vec(vec![Book::new(1, Metadata::new("Dune", ["Frank Herbert"]), CopySlot::Retail, copy)]).unwrap()
    }

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("nested").join("catalog.json"));
        let mut books = books();
        assert!(store.save(&books).await.unwrap());
        assert!(!store.save(&books).await.unwrap());

        books.get_mut(1).unwrap().progress = Progress::Reading;
        assert!(store.save(&books).await.unwrap());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.to_vec(), books.to_vec());
        assert!(!store.save(&loaded).await.unwrap());
    }

    #[tokio::test]
    async fn test_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        store.save(&books()).await.unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["last_id"], 1);
        let array = raw["books"].as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["metadata"]["title"], "Dune");
        assert_eq!(array[0]["retail"]["path"], "Frank Herbert/Dune [retail].epub");
    }

    #[tokio::test]
    async fn test_removed_ids_stay_retired_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        let mut books = books();
        let copy = PhysicalCopy::new("Isaac Asimov/Foundation.epub", Hash::of(b"foundation"));
        books.insert(Book::new(2, Metadata::new("Foundation", ["Isaac Asimov"]), CopySlot::NonRetail, copy)).unwrap();
        books.remove(2);
        store.save(&books).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.next_id(), 3);
    }

    #[tokio::test]
    async fn test_bare_array_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_vec(&books().to_vec()).unwrap()).unwrap();
        let loaded = CatalogStore::new(path).load().await.unwrap();
        assert_eq!(loaded.to_vec(), books().to_vec());
        assert_eq!(loaded.next_id(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = CatalogStore::new(path).load().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }
}
