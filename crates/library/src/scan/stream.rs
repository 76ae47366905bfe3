use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::scan::EpubCandidate;
use crate::scan::error::{ErrorKind as ScanErrorKind, Result as ScanResult};
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use shelf_catalog::{Collection, Hash, HashLedger};
use shelf_storage::BackendHandle;
use std::path::PathBuf;

/// Progress events emitted by [`scan_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of files found.
/// 3. [`Hashed`](Self::Hashed) or [`Skipped`](Self::Skipped), once per file
///    in completion order.
/// 4. [`Complete`](Self::Complete), exactly once.
#[derive(Debug)]
pub enum ScanEvent {
    Started,
    DiscoveryComplete(u64),
    Hashed(EpubCandidate),
    /// The file couldn't be read; it is left out of the result.
    Skipped { path: PathBuf },
    Complete,
}

/// Streams [`ScanEvent`]s for every file `source` lists, hashing at most
/// `workers` files at a time on the blocking thread pool.
///
/// Unreadable files don't end the stream; they are logged and reported as
/// [`ScanEvent::Skipped`].
pub fn scan_stream<'a, C: Collection + ?Sized>(
    source: &'a BackendHandle,
    ledger: &'a HashLedger,
    collection: &'a C,
    workers: usize,
) -> impl Stream<Item = LibraryResult<ScanEvent>> + 'a {
    stream! {
        for await event in scan_inner(source, ledger, collection, workers) {
            yield event.or_raise(|| LibraryErrorKind::Scan);
        }
    }
}

fn scan_inner<'a, C: Collection + ?Sized>(
    source: &'a BackendHandle,
    ledger: &'a HashLedger,
    collection: &'a C,
    workers: usize,
) -> impl Stream<Item = ScanResult<ScanEvent>> + 'a {
    stream!({
        yield Ok(ScanEvent::Started);

        // Discover everything first so the total is known up front.
        let mut paths = Vec::new();
        let mut listing = source.list_stream(None);
        while let Some(entry) = listing.next().await {
            match entry {
                Ok(file) => paths.push(file.path.clone()),
                Err(e) => tracing::warn!(backend = source.name(), error = ?e, "Skipping unlistable entry"),
            }
        }
        drop(listing);
        yield Ok(ScanEvent::DiscoveryComplete(u64::try_from(paths.len()).unwrap_or(u64::MAX)));

        let mut pending = paths.into_iter().map(|path| hash_file(source, path));
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.by_ref().take(workers.max(1)));
        while let Some((path, result)) = processing.next().await {
            match result {
                Ok(hash) => {
                    let imported = ledger.contains(&hash);
                    let imported_but_missing = imported && collection.find_by_hash(hash.as_str()).is_none();
                    yield Ok(ScanEvent::Hashed(EpubCandidate { path, hash, imported, imported_but_missing }));
                },
                Err(e) => {
                    tracing::warn!(backend = source.name(), path = %path.display(), error = ?e, "Skipping unreadable file");
                    yield Ok(ScanEvent::Skipped { path });
                },
            }
            if let Some(next) = pending.next() {
                processing.push(next);
            }
        }

        yield Ok(ScanEvent::Complete);
    })
}

/// Read `path` and digest it on the blocking pool. The bytes are dropped as
/// soon as the digest is known.
async fn hash_file(source: &BackendHandle, path: PathBuf) -> (PathBuf, ScanResult<Hash>) {
    let result = async {
        let bytes = source.read(&path).await.or_raise(|| ScanErrorKind::Storage)?;
        tokio::task::spawn_blocking(move || Hash::of(bytes)).await.or_raise(|| ScanErrorKind::Hash)
    }
    .await;
    (path, result)
}
