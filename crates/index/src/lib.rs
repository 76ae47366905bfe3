//! A derived, disposable search index over the catalog.
//!
//! The catalog is the source of truth. Everything here can be thrown away and
//! rebuilt from it at any time, which is exactly what [`IndexSynchronizer`]
//! does whenever an incremental update fails.

pub mod error;
mod memory;
mod sync;

pub use crate::memory::MemoryIndex;
pub use crate::sync::{IndexSynchronizer, SyncOutcome};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shelf_catalog::Book;
use std::path::Path;

/// The searchable projection of a [`Book`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
impl From<&Book> for Document {
    fn from(book: &Book) -> Self {
        let metadata = &book.metadata;
        Self {
            id: book.id,
            title: metadata.title.clone(),
            authors: metadata.authors.clone(),
            year: metadata.year,
            language: metadata.language.clone(),
            series: metadata.series.as_ref().map(|s| s.name.clone()),
            tags: metadata.tags.clone(),
            description: metadata.description.clone(),
        }
    }
}
impl Document {
    /// Lowercased alphanumeric words of every searchable field.
    pub fn terms(&self) -> impl Iterator<Item = String> + '_ {
        let year = self.year.map(|y| y.to_string());
        std::iter::once(self.title.as_str())
            .chain(self.authors.iter().map(String::as_str))
            .chain(self.language.as_deref())
            .chain(self.series.as_deref())
            .chain(self.tags.iter().map(String::as_str))
            .chain(self.description.as_deref())
            .flat_map(tokenize)
            .chain(year)
    }
}

/// Split `text` into lowercased alphanumeric words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase).collect()
}

/// The key a book is indexed under: the absolute path of its primary copy.
pub fn key_for(book: &Book, root: &Path) -> Option<String> {
    book.primary().map(|copy| root.join(&copy.path).to_string_lossy().into_owned())
}

/// A document index keyed by string.
///
/// Results are unranked; implementations return matching keys in a stable
/// order.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add or overwrite the document stored under `key`.
    fn index(&mut self, key: &str, document: Document) -> Result<()>;
    /// Remove `key`; removing an absent key isn't an error.
    fn delete(&mut self, key: &str) -> Result<()>;
    /// Keys of the documents matching every word of `query`.
    fn query(&self, query: &str) -> Result<Vec<String>>;
    fn count(&self) -> u64;
    fn clear(&mut self) -> Result<()>;
    /// Persist pending changes.
    async fn flush(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_catalog::{CopySlot, Hash, Metadata, PhysicalCopy, Series};

    #[test]
    fn test_document_terms() {
        let metadata = Metadata {
            year: Some(1965),
            series: Some(Series { name: "Dune Chronicles".into(), position: Some(1) }),
            tags: vec!["sci-fi".into()],
            ..Metadata::new("Dune", ["Frank Herbert"])
        };
        let copy = PhysicalCopy::new("Frank Herbert/Dune.epub", Hash::of(b"dune"));
        let book = Book::new(3, metadata, CopySlot::NonRetail, copy);
        let terms: Vec<String> = Document::from(&book).terms().collect();
        for expected in ["dune", "frank", "herbert", "chronicles", "sci", "fi", "1965"] {
            assert!(terms.iter().any(|t| t == expected), "missing {expected}");
        }
        assert_eq!(key_for(&book, Path::new("/library")).as_deref(), Some("/library/Frank Herbert/Dune.epub"));
    }
}
