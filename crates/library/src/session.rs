//! An open library: the lock, the catalog, the ledger and the search index,
//! held together for the length of one command.

use crate::error::{ErrorKind, Result};
use crate::external::{EpubReader, MetadataReader, NoLookup, OnlineLookup, Prompter, Unattended};
use crate::import::{ImportReport, Importer};
use crate::lock::LockGuard;
use crate::refresh::{RefreshReport, rename_copy, undo_renames};
use crate::scan::{Candidates, scan_backend, source_backend};
use crate::PathGenerator;
use exn::{OptionExt, ResultExt};
use shelf_catalog::backup::{BackupOutcome, backup};
use shelf_catalog::{Book, Books, CatalogStore, Collection, CopySlot, EditableField, HashLedger};
use shelf_config::Config;
use shelf_index::{IndexSynchronizer, MemoryIndex, SearchIndex, SyncOutcome, key_for};
use shelf_storage::BackendHandle;
use shelf_storage::backend::LocalBackend;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// The pluggable parts of a [`Library`].
pub struct Collaborators {
    pub reader: Box<dyn MetadataReader>,
    pub lookup: Box<dyn OnlineLookup>,
    pub prompter: Box<dyn Prompter>,
    pub index: Box<dyn SearchIndex>,
}

impl Collaborators {
    /// EPUB metadata, no remote lookup, answers from `config`, and an index
    /// that is never persisted.
    pub fn unattended(config: &Config) -> Self {
        Self {
            reader: Box::new(EpubReader),
            lookup: Box::new(NoLookup),
            prompter: Box::new(Unattended::new(config.import.clone())),
            index: Box::new(MemoryIndex::ephemeral()),
        }
    }
}

/// A library opened for modification.
///
/// Holds the lock for its whole lifetime; only one `Library` per data
/// directory can exist at a time, across processes.
pub struct Library {
    config: Config,
    /// The library root.
    backend: BackendHandle,
    generator: PathGenerator,
    store: CatalogStore,
    books: Books,
    ledger: HashLedger,
    reader: Box<dyn MetadataReader>,
    lookup: Box<dyn OnlineLookup>,
    prompter: Box<dyn Prompter>,
    index: Box<dyn SearchIndex>,
    lock: LockGuard,
}

impl Library {
    /// Open the library described by `config` on the local filesystem, with
    /// the persisted search index and unattended prompting.
    pub async fn open(config: Config) -> Result<Self> {
        let backend: BackendHandle =
            Arc::new(LocalBackend::new("library", &config.library_root).or_raise(|| ErrorKind::Storage)?);
        let collaborators = Collaborators {
            index: Box::new(MemoryIndex::open(config.index_path()).await),
            ..Collaborators::unattended(&config)
        };
        Self::open_with(config, backend, collaborators).await
    }

    /// Open with an explicit library root backend and collaborators.
    ///
    /// Takes the lock first; fails with
    /// [`AlreadyLocked`](ErrorKind::AlreadyLocked) while another session is
    /// open. Hashes of live copies missing from the ledger are added back, and
    /// the search index is rebuilt when it doesn't cover every book.
    #[instrument(skip_all, fields(root = %config.library_root.display()))]
    pub async fn open_with(config: Config, backend: BackendHandle, collaborators: Collaborators) -> Result<Self> {
        let lock = LockGuard::acquire(config.lock_path())?;
        let generator: PathGenerator = config.filename_template.parse()?;
        let store = CatalogStore::new(config.catalog_path());
        let books = store.load().await.or_raise(|| ErrorKind::Catalog)?;
        let mut ledger = HashLedger::load(config.ledger_path()).await.or_raise(|| ErrorKind::Catalog)?;

        let mut healed = 0usize;
        for book in books.books() {
            for (_, copy) in book.copies() {
                if ledger.insert(copy.hash.clone()) {
                    healed += 1;
                }
            }
        }
        if healed > 0 {
            tracing::warn!(healed, "Hash ledger was behind the catalog");
            ledger.save().await.or_raise(|| ErrorKind::Catalog)?;
        }

        let Collaborators { reader, lookup, prompter, index } = collaborators;
        let mut library = Self { config, backend, generator, store, books, ledger, reader, lookup, prompter, index, lock };
        if library.index.count() != u64::try_from(library.books.len()).unwrap_or(u64::MAX) {
            tracing::info!(indexed = library.index.count(), books = library.books.len(), "Search index is stale");
            if let Err(e) = library.rebuild_index().await {
                tracing::warn!(error = ?e, "Search index unavailable until the next rebuild");
            }
        }
        tracing::info!(books = library.books.len(), hashes = library.ledger.len(), "Opened library");
        Ok(library)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn books(&self) -> &Books {
        &self.books
    }

    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Classify every EPUB below `dir` without changing anything.
    pub async fn scan(&self, dir: impl AsRef<Path>) -> Result<Candidates> {
        let source = source_backend(dir)?;
        scan_backend(&source, &self.ledger, &self.books, self.config.hash_workers).await
    }

    /// Scan `dir` and import every candidate into `slot`.
    ///
    /// When `dir` is the library root, files are adopted where they lie.
    pub async fn import(&mut self, dir: impl AsRef<Path>, slot: CopySlot) -> Result<ImportReport> {
        let in_place = same_directory(dir.as_ref(), &self.config.library_root);
        let source = source_backend(dir)?;
        self.import_candidates(&source, slot, in_place).await
    }

    /// Scan `source` and import every candidate into `slot`.
    ///
    /// Files already held by a book are reported as duplicates; new and
    /// missing files go through the import engine one by one. Passing the
    /// library's own backend adopts files where they lie.
    pub async fn import_from(&mut self, source: &BackendHandle, slot: CopySlot) -> Result<ImportReport> {
        let in_place = Arc::ptr_eq(source, &self.backend);
        self.import_candidates(source, slot, in_place).await
    }

    #[instrument(skip_all, fields(source = source.name(), %slot, in_place = in_place))]
    async fn import_candidates(&mut self, source: &BackendHandle, slot: CopySlot, in_place: bool) -> Result<ImportReport> {
        let candidates = scan_backend(source, &self.ledger, &self.books, self.config.hash_workers).await?;
        let before = self.books.clone();
        let importer = Importer {
            source,
            library: &self.backend,
            generator: &self.generator,
            store: &self.store,
            reader: self.reader.as_ref(),
            lookup: self.lookup.as_ref(),
            prompter: self.prompter.as_ref(),
            api_key: self.config.online.api_key.as_deref(),
            in_place,
        };
        let report = importer.import_all(candidates.all(), slot, &mut self.books, &mut self.ledger).await;
        self.sync_index(&before).await;
        tracing::info!(%report, "Import finished");
        Ok(report)
    }

    /// Drop vanished copies and empty books, and rename copies onto their
    /// canonical paths.
    pub async fn refresh(&mut self) -> Result<RefreshReport> {
        let before = self.books.clone();
        let result = crate::refresh::refresh(&self.backend, &self.generator, &self.store, &mut self.books).await;
        self.sync_index(&before).await;
        result.or_raise(|| ErrorKind::Refresh)
    }

    /// Apply `field` to book `id`, returning whether anything changed.
    /// Copies are renamed when the change affects their filename.
    #[instrument(skip(self, field), fields(field = %field.name()))]
    pub async fn edit(&mut self, id: u64, field: EditableField) -> Result<bool> {
        let before = self.books.clone();
        let book = self.books.get_mut(id).ok_or_raise(|| ErrorKind::BookNotFound(id))?;
        let renames = field.affects_filename();
        if !field.apply(book) {
            return Ok(false);
        }
        if let Err(e) = self.store.save(&self.books).await {
            self.books = before;
            return Err(e).or_raise(|| ErrorKind::Catalog);
        }
        let renamed = match renames {
            true => self.rename_all(id).await,
            false => Ok(()),
        };
        self.sync_index(&before).await;
        renamed.map(|()| true)
    }

    /// Mark the copy in `slot` of book `id` for replacement by the next
    /// import of a file for the same slot.
    pub async fn flag_for_replacement(&mut self, id: u64, slot: CopySlot) -> Result<()> {
        let before = self.books.clone();
        let book = self.books.get_mut(id).ok_or_raise(|| ErrorKind::BookNotFound(id))?;
        let copy = book.copy_mut(slot).ok_or_raise(|| ErrorKind::NoSuchCopy { id, slot })?;
        if copy.needs_replacement {
            return Ok(());
        }
        copy.needs_replacement = true;
        self.persist(before).await
    }

    /// Delete book `id` and its files. Its hashes stay in the ledger.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, id: u64) -> Result<Book> {
        let before = self.books.clone();
        let book = self.books.remove(id).ok_or_raise(|| ErrorKind::BookNotFound(id))?;
        self.persist(before).await?;
        for (slot, copy) in book.copies() {
            if let Err(e) = self.backend.delete(&copy.path).await {
                tracing::warn!(id, %slot, path = %copy.path.display(), error = ?e, "Could not delete copy");
            }
        }
        tracing::info!(id, title = %book.metadata.title, "Removed book");
        Ok(book)
    }

    /// Books matching every word of `query`, in index order.
    pub fn search(&self, query: &str) -> Result<Vec<&Book>> {
        let keys = self.index.query(query).or_raise(|| ErrorKind::Index)?;
        let by_key: HashMap<String, &Book> = self
            .books
            .books()
            .filter_map(|book| key_for(book, &self.config.library_root).map(|key| (key, book)))
            .collect();
        Ok(keys.iter().filter_map(|key| by_key.get(key).copied()).collect())
    }

    /// Clear the search index and index every book again.
    pub async fn rebuild_index(&mut self) -> Result<usize> {
        IndexSynchronizer::new(self.index.as_mut(), &self.config.library_root)
            .rebuild(&self.books)
            .await
            .or_raise(|| ErrorKind::Index)
    }

    /// Commit the catalog to the configured backup repository.
    pub async fn backup(&self) -> Result<BackupOutcome> {
        let archive = self.config.backup_dir.clone().ok_or_raise(|| ErrorKind::NoBackupDir)?;
        let catalog = self.store.path().to_path_buf();
        tokio::task::spawn_blocking(move || backup(&catalog, &archive))
            .await
            .or_raise(|| ErrorKind::Backup)?
            .or_raise(|| ErrorKind::Backup)
    }

    /// Flush the index and the ledger, then release the lock.
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.index.flush().await {
            tracing::warn!(error = ?e, "Could not flush search index");
        }
        self.ledger.save().await.or_raise(|| ErrorKind::Catalog)?;
        tracing::debug!("Closed library");
        Ok(())
    }

    /// Save the catalog, restoring `before` on failure, then update the
    /// index.
    async fn persist(&mut self, before: Books) -> Result<()> {
        if let Err(e) = self.store.save(&self.books).await {
            self.books = before;
            return Err(e).or_raise(|| ErrorKind::Catalog);
        }
        self.sync_index(&before).await;
        Ok(())
    }

    /// Move every copy of book `id` onto its canonical path. The files are
    /// moved back if the catalog can't record the new paths.
    async fn rename_all(&mut self, id: u64) -> Result<()> {
        let slots: Vec<CopySlot> = self.books.get(id).map(|b| b.copies().map(|(slot, _)| slot).collect()).unwrap_or_default();
        let snapshot = self.books.clone();
        let mut renamed = Vec::new();
        for slot in slots {
            match rename_copy(&self.backend, &self.generator, &mut self.books, id, slot).await {
                Ok(moved) => renamed.extend(moved),
                Err(e) => tracing::warn!(id, %slot, error = ?e, "Could not rename copy"),
            }
        }
        if renamed.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.store.save(&self.books).await {
            undo_renames(&self.backend, &renamed).await;
            self.books = snapshot;
            return Err(e).or_raise(|| ErrorKind::Catalog);
        }
        Ok(())
    }

    async fn sync_index(&mut self, before: &Books) -> SyncOutcome {
        let diff = self.books.diff(before);
        let outcome = IndexSynchronizer::new(self.index.as_mut(), &self.config.library_root).update(&diff, &self.books).await;
        tracing::debug!(?outcome, "Synchronized search index");
        outcome
    }
}

/// Whether `a` and `b` name the same existing directory.
fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
