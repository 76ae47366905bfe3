use crate::error::{ErrorKind, Result};
use crate::{Document, SearchIndex, tokenize};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// An in-memory index, optionally persisted as a JSON object of
/// `key -> document`.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    path: Option<PathBuf>,
    documents: BTreeMap<String, Document>,
    dirty: bool,
}

impl MemoryIndex {
    /// A throwaway index that is never written to disk.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Open the index persisted at `path`.
    ///
    /// A missing or unreadable index opens empty and is rebuilt by the caller
    /// once it notices the document count doesn't match the catalog.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!(error = %e, "Search index is corrupt; starting empty");
                    BTreeMap::new()
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Search index could not be read; starting empty");
                BTreeMap::new()
            },
        };
        tracing::debug!(documents = documents.len(), "Opened search index");
        Self { path: Some(path), documents, dirty: false }
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.documents.get(key)
    }

    fn matches(document: &Document, words: &[String]) -> bool {
        let terms: Vec<String> = document.terms().collect();
        words.iter().all(|word| terms.iter().any(|term| term.starts_with(word.as_str())))
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn index(&mut self, key: &str, document: Document) -> Result<()> {
        self.documents.insert(key.to_string(), document);
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.dirty |= self.documents.remove(key).is_some();
        Ok(())
    }

    fn query(&self, query: &str) -> Result<Vec<String>> {
        let words = tokenize(query);
        if words.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .documents
            .iter()
            .filter(|(_, document)| Self::matches(document, &words))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn count(&self) -> u64 {
        self.documents.len() as u64
    }

    fn clear(&mut self) -> Result<()> {
        self.dirty |= !self.documents.is_empty();
        self.documents.clear();
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref().filter(|_| self.dirty) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(&self.documents).or_raise(|| ErrorKind::Corrupt("serialize"))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.or_raise(|| ErrorKind::Io(tmp.clone()))?;
        tokio::fs::rename(&tmp, path).await.or_raise(|| ErrorKind::Io(path.clone()))?;
        tracing::debug!(documents = self.documents.len(), "Flushed search index");
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u64, title: &str, author: &str) -> Document {
        Document { id, title: title.into(), authors: vec![author.into()], ..Default::default() }
    }

    #[test]
    fn test_query_requires_every_word() {
        let mut index = MemoryIndex::ephemeral();
        index.index("/lib/dune.epub", doc(1, "Dune", "Frank Herbert")).unwrap();
        index.index("/lib/messiah.epub", doc(2, "Dune Messiah", "Frank Herbert")).unwrap();
        index.index("/lib/emma.epub", doc(3, "Emma", "Jane Austen")).unwrap();

        assert_eq!(index.query("dune").unwrap(), vec!["/lib/dune.epub", "/lib/messiah.epub"]);
        assert_eq!(index.query("Dune mess").unwrap(), vec!["/lib/messiah.epub"]);
        assert_eq!(index.query("austen").unwrap(), vec!["/lib/emma.epub"]);
        assert!(index.query("   ").unwrap().is_empty());
        assert!(index.query("tolkien").unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let mut index = MemoryIndex::ephemeral();
        index.index("a", doc(1, "A", "x")).unwrap();
        index.index("b", doc(2, "B", "x")).unwrap();
        index.delete("a").unwrap();
        index.delete("missing").unwrap();
        assert_eq!(index.count(), 1);
        index.clear().unwrap();
        assert_eq!(index.count(), 0);
    }

    #[tokio::test]
    async fn test_flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut index = MemoryIndex::open(&path).await;
        index.index("/lib/dune.epub", doc(1, "Dune", "Frank Herbert")).unwrap();
        index.flush().await.unwrap();

        let reopened = MemoryIndex::open(&path).await;
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.get("/lib/dune.epub").map(|d| d.id), Some(1));
    }

    #[tokio::test]
    async fn test_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"\x00garbage").unwrap();
        assert_eq!(MemoryIndex::open(&path).await.count(), 0);
    }
}
