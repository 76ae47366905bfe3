//! Reconciling the catalog with what is actually in the library root.
//!
//! A refresh drops copies whose files have disappeared, removes books left
//! without any copy, and moves every remaining copy onto the path its
//! metadata renders to. Running it twice in a row changes nothing the second
//! time.

pub mod error;

use crate::conflict::vacant_path;
use crate::refresh::error::{ErrorKind, Result};
use crate::{MAX_PROCESS_CONCURRENCY, PathGenerator};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use shelf_catalog::{Books, CatalogStore, Collection, CopySlot};
use shelf_storage::BackendHandle;
use std::path::PathBuf;
use tracing::instrument;

/// A copy moved by [`rename_copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Renamed {
    pub id: u64,
    pub slot: CopySlot,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// What a refresh changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Copies whose file no longer exists.
    pub removed_copies: usize,
    /// Books deleted because they had no copy left.
    pub removed_books: usize,
    /// Copies moved onto their canonical path.
    pub renamed: usize,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Refresh `books` against `library`, then save them through `store`.
///
/// Individual renames that fail are logged and skipped; the copy keeps its
/// current path until the next refresh. If the catalog can't be saved, every
/// rename is moved back and `books` is left as it was.
#[instrument(skip_all, fields(books = books.len()))]
pub(crate) async fn refresh(
    library: &BackendHandle,
    generator: &PathGenerator,
    store: &CatalogStore,
    books: &mut Books,
) -> Result<RefreshReport> {
    let snapshot = books.clone();
    let mut report = RefreshReport::default();

    for (id, slot) in vanished(library, books).await? {
        if let Some(copy) = books.get_mut(id).and_then(|book| book.take_copy(slot)) {
            tracing::info!(id, %slot, path = %copy.path.display(), "Copy no longer exists");
            report.removed_copies += 1;
        }
    }
    for book in books.remove_empty() {
        tracing::info!(id = book.id, title = %book.metadata.title, "Removing book without copies");
        report.removed_books += 1;
    }

    let copies: Vec<(u64, CopySlot)> =
        books.books().flat_map(|book| book.copies().map(move |(slot, _)| (book.id, slot))).collect();
    let mut renamed = Vec::new();
    for (id, slot) in copies {
        match rename_copy(library, generator, books, id, slot).await {
            Ok(Some(moved)) => renamed.push(moved),
            Ok(None) => {},
            Err(e) => tracing::warn!(id, %slot, error = ?e, "Could not rename copy"),
        }
    }
    report.renamed = renamed.len();

    if let Err(e) = store.save(books).await {
        undo_renames(library, &renamed).await;
        *books = snapshot;
        return Err(e).or_raise(|| ErrorKind::Catalog);
    }
    tracing::info!(
        removed_copies = report.removed_copies,
        removed_books = report.removed_books,
        renamed = report.renamed,
        "Refresh complete"
    );
    Ok(report)
}

/// Every copy whose file is gone, checked concurrently.
async fn vanished(library: &BackendHandle, books: &Books) -> Result<Vec<(u64, CopySlot)>> {
    let mut pending = books
        .books()
        .flat_map(|book| book.copies().map(move |(slot, copy)| (book.id, slot, copy.path.clone())))
        .map(|(id, slot, path)| async move { (id, slot, library.exists(&path).await) });
    let mut processing = FuturesUnordered::new();
    processing.extend(pending.by_ref().take(MAX_PROCESS_CONCURRENCY));
    let mut gone = Vec::new();
    while let Some((id, slot, exists)) = processing.next().await {
        if !exists.or_raise(|| ErrorKind::Storage)? {
            gone.push((id, slot));
        }
        if let Some(next) = pending.next() {
            processing.push(next);
        }
    }
    gone.sort_unstable_by_key(|(id, slot)| (*id, slot.is_retail()));
    Ok(gone)
}

/// Move the copy in `slot` of book `id` onto its canonical path, returning
/// what moved if anything did. Only `books` in memory is updated.
///
/// Idempotent: a copy already on its canonical path (or on the numbered
/// variant it was given because the canonical path is taken) stays put.
#[instrument(skip(library, generator, books))]
pub(crate) async fn rename_copy(
    library: &BackendHandle,
    generator: &PathGenerator,
    books: &mut Books,
    id: u64,
    slot: CopySlot,
) -> Result<Option<Renamed>> {
    let book = books.get(id).ok_or_raise(|| ErrorKind::Missing)?;
    let current = book.copy(slot).ok_or_raise(|| ErrorKind::Missing)?.path.clone();
    let canonical = generator.generate_for(&book.metadata, slot).or_raise(|| ErrorKind::Template)?;
    if canonical == current {
        return Ok(None);
    }
    let target = vacant_path(library, &*books, &canonical, Some(&current))
        .await
        .or_raise(|| ErrorKind::Storage)?
        .ok_or_raise(|| ErrorKind::Conflict)?;
    if target == current {
        return Ok(None);
    }
    library.rename(&current, &target).await.or_raise(|| ErrorKind::Storage)?;
    let copy = books.get_mut(id).and_then(|book| book.copy_mut(slot)).ok_or_raise(|| ErrorKind::Missing)?;
    copy.path = target.clone();
    tracing::debug!(from = %current.display(), to = %target.display(), "Renamed copy");
    Ok(Some(Renamed { id, slot, from: current, to: target }))
}

/// Move renamed files back where they were, newest first. Used when the
/// catalog recording the new paths couldn't be saved.
pub(crate) async fn undo_renames(library: &BackendHandle, renamed: &[Renamed]) {
    for moved in renamed.iter().rev() {
        match library.rename(&moved.to, &moved.from).await {
            Ok(()) => tracing::debug!(id = moved.id, slot = %moved.slot, path = %moved.from.display(), "Moved copy back"),
            Err(e) => tracing::error!(
                id = moved.id,
                slot = %moved.slot,
                from = %moved.to.display(),
                to = %moved.from.display(),
                error = ?e,
                "Could not move copy back; the catalog no longer matches the library"
            ),
        }
    }
}
