use crate::PathGenerator;
use crate::conflict::vacant_path;
use crate::external::{Confirmation, MetadataReader, OnlineLookup, Prompter, merge_metadata};
use crate::import::error::{ErrorKind, Result};
use crate::import::{Decision, ImportReport, Outcome, resolve};
use crate::refresh::{rename_copy, undo_renames};
use crate::scan::EpubCandidate;
use exn::{OptionExt, ResultExt};
use shelf_catalog::{Book, Books, CatalogStore, Collection, CopySlot, Hash, HashLedger, Metadata, PhysicalCopy};
use shelf_storage::BackendHandle;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Everything an import needs besides the mutable catalog state.
pub(crate) struct Importer<'a> {
    /// Where candidates are read from.
    pub source: &'a BackendHandle,
    /// The library root copies are written to.
    pub library: &'a BackendHandle,
    pub generator: &'a PathGenerator,
    pub store: &'a CatalogStore,
    pub reader: &'a dyn MetadataReader,
    pub lookup: &'a dyn OnlineLookup,
    pub prompter: &'a dyn Prompter,
    /// Remote lookup only happens when a key is configured.
    pub api_key: Option<&'a str>,
    /// `source` is the library root itself. Candidate paths are then library
    /// paths: they may match a book by path, and files are adopted where they
    /// lie instead of being copied.
    pub in_place: bool,
}

impl Importer<'_> {
    /// Import `candidates` one after another into `slot`.
    ///
    /// A failing candidate is logged and recorded in
    /// [`ImportReport::failed`]; the run carries on with the next one.
    pub async fn import_all<'c>(
        &self,
        candidates: impl IntoIterator<Item = &'c EpubCandidate>,
        slot: CopySlot,
        books: &mut Books,
        ledger: &mut HashLedger,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        for candidate in candidates {
            match self.import(candidate, slot, books, ledger).await {
                Ok(outcome) => {
                    tracing::info!(path = %candidate.path.display(), %outcome, "Processed candidate");
                    report.outcomes.push((candidate.path.clone(), outcome));
                },
                Err(e) => {
                    tracing::error!(path = %candidate.path.display(), error = ?e, "Import failed");
                    report.failed.push(candidate.path.clone());
                },
            }
        }
        report
    }

    /// Import a single candidate.
    ///
    /// The copy is written to the library first, then the catalog is saved,
    /// then displaced files are deleted, then the hash is recorded. A failed
    /// catalog save restores `books` and leaves the written file behind as
    /// an orphan; importing the library root in place adopts it later.
    #[instrument(skip_all, fields(path = %candidate.path.display(), %slot))]
    pub async fn import(
        &self,
        candidate: &EpubCandidate,
        slot: CopySlot,
        books: &mut Books,
        ledger: &mut HashLedger,
    ) -> Result<Outcome> {
        let hash = &candidate.hash;
        // Known content is rejected without touching the file.
        if let Some(book) = books.find_by_hash(hash.as_str()) {
            return Ok(Outcome::Duplicate { id: book.id });
        }
        if candidate.imported_but_missing {
            let question = Confirmation::ReimportMissing { path: candidate.path.clone() };
            if !self.prompter.confirm(&question) {
                return Ok(Outcome::Declined);
            }
        }
        let bytes = self.source.read(&candidate.path).await.or_raise(|| ErrorKind::Storage)?;
        if Hash::of(&bytes) != *hash {
            exn::bail!(ErrorKind::Changed(candidate.path.clone()));
        }

        // Paths only identify a book when they are relative to the library root.
        let (target, metadata) = match books.find_by_path(&candidate.path).filter(|_| self.in_place) {
            Some(book) => (Some(book.id), None),
            None => {
                let metadata = self.metadata(&candidate.path, &bytes).await;
                (books.find_similar(&metadata).map(|book| book.id), Some(metadata))
            },
        };
        let decision = resolve(target.and_then(|id| books.get(id)), hash, slot);
        tracing::debug!(?decision, "Resolved candidate");

        let id = match decision {
            Decision::RejectDuplicate { id } => return Ok(Outcome::Duplicate { id }),
            Decision::RejectSuperseded { id } => return Ok(Outcome::Superseded { id }),
            Decision::CreateWork => books.next_id(),
            Decision::AttachCopy { id } | Decision::ReplaceRetail { id } | Decision::ReplaceNonRetail { id } => id,
        };
        if decision.requires_confirmation() {
            let title = books.get(id).map(|b| b.metadata.title.clone()).unwrap_or_default();
            if !self.prompter.confirm(&Confirmation::Replace { id, title, slot }) {
                return Ok(Outcome::Declined);
            }
        }

        // Existing books keep their own metadata; only new ones use what was
        // read from the file.
        let metadata = match books.get(id) {
            Some(book) => book.metadata.clone(),
            None => metadata.ok_or_raise(|| ErrorKind::Inconsistent)?,
        };
        let canonical = self.generator.generate_for(&metadata, slot).or_raise(|| ErrorKind::Template)?;
        let path = match self.in_place {
            true => candidate.path.clone(),
            false => {
                let path = vacant_path(self.library, &*books, &canonical, None)
                    .await
                    .or_raise(|| ErrorKind::Storage)?
                    .ok_or_raise(|| ErrorKind::Conflict)?;
                self.library.write(&path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
                path
            },
        };
        let copy = PhysicalCopy::new(&path, hash.clone());

        let snapshot = books.clone();
        let (mut outcome, displaced) = match carry_out(books, decision, id, metadata, slot, copy) {
            Ok(done) => done,
            Err(e) => {
                *books = snapshot;
                return Err(e);
            },
        };
        if let Err(e) = self.store.save(books).await {
            *books = snapshot;
            if !self.in_place {
                tracing::warn!(orphan = %path.display(), "Catalog save failed; the copied file is left behind");
            }
            return Err(e).or_raise(|| ErrorKind::Catalog);
        }

        for old in displaced {
            self.discard(books, &old).await;
        }
        if path != canonical
            && let Some(settled) = self.settle(books, id, slot).await
        {
            outcome = outcome.moved_to(settled);
        }

        ledger.insert(hash.clone());
        if let Err(e) = ledger.save().await {
            // The catalog already holds the copy, and the ledger is healed
            // from live copies when the library is next opened.
            tracing::warn!(error = ?e, "Could not save hash ledger");
        }
        Ok(outcome)
    }

    /// Metadata for a file no book is known to hold: read from the container,
    /// falling back to the filename, offered to the user for correction, and
    /// merged with a remote lookup when one is configured.
    async fn metadata(&self, path: &Path, bytes: &[u8]) -> Metadata {
        let local = match self.reader.read(bytes).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(error = ?e, "Unreadable metadata; falling back to the filename");
                let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                Metadata::from_file_stem(&stem)
            },
        };
        let local = self.prompter.edit_metadata(local);
        let Some(api_key) = self.api_key else {
            return local;
        };
        match self.lookup.search(&local, api_key).await {
            Ok(remote) => merge_metadata(local, &remote, self.prompter),
            Err(e) => {
                tracing::warn!(error = ?e, "Online lookup failed; keeping local metadata");
                local
            },
        }
    }

    /// Delete a displaced copy's file unless something still points at it.
    async fn discard(&self, books: &Books, old: &PhysicalCopy) {
        if books.find_by_path(&old.path).is_some() {
            return;
        }
        match self.library.delete(&old.path).await {
            Ok(()) => tracing::debug!(path = %old.path.display(), "Deleted displaced copy"),
            Err(e) => tracing::warn!(path = %old.path.display(), error = ?e, "Could not delete displaced copy"),
        }
    }

    /// A copy written next to a file that was displaced afterwards, or adopted
    /// under another name, moves onto the canonical name.
    async fn settle(&self, books: &mut Books, id: u64, slot: CopySlot) -> Option<PathBuf> {
        let snapshot = books.clone();
        match rename_copy(self.library, self.generator, books, id, slot).await {
            Ok(None) => None,
            Ok(Some(moved)) => {
                if let Err(e) = self.store.save(books).await {
                    tracing::warn!(error = ?e, "Could not record the settled path");
                    undo_renames(self.library, std::slice::from_ref(&moved)).await;
                    *books = snapshot;
                    return None;
                }
                tracing::debug!(path = %moved.to.display(), "Moved copy onto its canonical path");
                Some(moved.to)
            },
            Err(e) => {
                tracing::warn!(error = ?e, "Could not move copy onto its canonical path");
                None
            },
        }
    }
}

/// Apply `decision` to `books`, returning the outcome and the copies that
/// were pushed out.
fn carry_out(
    books: &mut Books,
    decision: Decision,
    id: u64,
    metadata: Metadata,
    slot: CopySlot,
    copy: PhysicalCopy,
) -> Result<(Outcome, Vec<PhysicalCopy>)> {
    let path: PathBuf = copy.path.clone();
    if decision == Decision::CreateWork {
        books.insert(Book::new(id, metadata, slot, copy)).or_raise(|| ErrorKind::Inconsistent)?;
        return Ok((Outcome::Created { id, path }, Vec::new()));
    }
    let book = books.get_mut(id).ok_or_raise(|| ErrorKind::Inconsistent)?;
    let replaced = book.set_copy(slot, copy);
    // A retail copy always leaves the book without its non-retail one.
    let trumped = match slot {
        CopySlot::Retail => book.take_copy(CopySlot::NonRetail),
        CopySlot::NonRetail => None,
    };
    let outcome = match decision {
        Decision::AttachCopy { .. } => Outcome::Attached { id, slot, path, trumped: trumped.is_some() },
        _ => Outcome::Replaced { id, slot, path },
    };
    Ok((outcome, replaced.into_iter().chain(trumped).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{EpubReader, NoLookup, Unattended};
    use shelf_storage::backend::MockBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_file_changed_since_scan_is_not_imported() {
        let dir = tempfile::tempdir().unwrap();
        let source: BackendHandle = Arc::new(MockBackend::with_files([("Frank Herbert - Dune.epub", b"edited".to_vec())]));
        let mock = Arc::new(MockBackend::default());
        let library: BackendHandle = mock.clone();
        let generator: PathGenerator = "{{ author }}/{{ title }}".parse().unwrap();
        let store = CatalogStore::new(dir.path().join("catalog.json"));
        let importer = Importer {
            source: &source,
            library: &library,
            generator: &generator,
            store: &store,
            reader: &EpubReader,
            lookup: &NoLookup,
            prompter: &Unattended::default(),
            api_key: None,
            in_place: false,
        };
        let candidate = EpubCandidate {
            path: PathBuf::from("Frank Herbert - Dune.epub"),
            hash: Hash::of("original"),
            imported: false,
            imported_but_missing: false,
        };
        let mut books = Books::new();
        let mut ledger = HashLedger::new(dir.path().join("hashes.json"));

        let err = importer.import(&candidate, CopySlot::NonRetail, &mut books, &mut ledger).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Changed(path) if *path == candidate.path));
        assert!(books.is_empty());
        assert!(ledger.is_empty());
        assert!(mock.paths().await.is_empty());
    }
}
