use crate::error::{ErrorKind, Result};
use crate::{Document, SearchIndex, key_for};
use exn::ResultExt;
use shelf_catalog::{BookDiff, Books, Collection};
use std::path::Path;
use tracing::instrument;

/// How an index synchronization went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The diff was empty.
    Unchanged,
    /// The diff was applied incrementally; holds the number of changed books.
    Updated(usize),
    /// The incremental update failed and the index was rebuilt; holds the
    /// number of indexed books.
    Rebuilt(usize),
    /// Both the update and the rebuild failed. The index is stale until the
    /// next successful rebuild.
    Failed,
}

/// Keeps a [`SearchIndex`] in step with the catalog.
pub struct IndexSynchronizer<'a> {
    index: &'a mut dyn SearchIndex,
    root: &'a Path,
}

impl<'a> IndexSynchronizer<'a> {
    /// `root` is the library root that copy paths are relative to.
    pub fn new(index: &'a mut dyn SearchIndex, root: &'a Path) -> Self {
        Self { index, root }
    }

    /// Apply `diff`, falling back to a rebuild from `books` when anything
    /// fails. Failures are logged, never returned.
    #[instrument(skip_all, fields(changes = diff.len()))]
    pub async fn update(&mut self, diff: &BookDiff, books: &Books) -> SyncOutcome {
        if diff.is_empty() {
            return SyncOutcome::Unchanged;
        }
        match self.update_inner(diff).await {
            Ok(()) => {
                tracing::debug!("Search index updated");
                SyncOutcome::Updated(diff.len())
            },
            Err(e) => {
                tracing::warn!(error = ?e, "Incremental index update failed; rebuilding");
                match self.rebuild(books).await {
                    Ok(count) => SyncOutcome::Rebuilt(count),
                    Err(e) => {
                        tracing::warn!(error = ?e, "Search index rebuild failed");
                        SyncOutcome::Failed
                    },
                }
            },
        }
    }

    async fn update_inner(&mut self, diff: &BookDiff) -> Result<()> {
        let stale = diff.removed.iter().chain(diff.modified.iter().map(|(before, _)| before));
        for book in stale {
            if let Some(key) = key_for(book, self.root) {
                self.index.delete(&key)?;
            }
        }
        let fresh = diff.added.iter().chain(diff.modified.iter().map(|(_, after)| after));
        for book in fresh {
            if let Some(key) = key_for(book, self.root) {
                self.index.index(&key, Document::from(book))?;
            }
        }
        self.index.flush().await
    }

    /// Discard the index and re-derive it from `books`, returning how many
    /// books were indexed.
    #[instrument(skip_all, fields(books = books.len()))]
    pub async fn rebuild(&mut self, books: &Books) -> Result<usize> {
        self.rebuild_inner(books).await.or_raise(|| ErrorKind::RebuildFailed)
    }

    async fn rebuild_inner(&mut self, books: &Books) -> Result<usize> {
        self.index.clear()?;
        let mut count = 0;
        for book in books.books() {
            if let Some(key) = key_for(book, self.root) {
                self.index.index(&key, Document::from(book))?;
                count += 1;
            }
        }
        self.index.flush().await?;
        tracing::info!(count, "Rebuilt search index");
        Ok(count)
    }
}
