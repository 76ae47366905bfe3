use crate::error::{ErrorKind, Result};
use crate::hash::Hash;
use crate::store::write_atomically;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Serialize, Deserialize)]
struct LedgerDocument {
    hashes: BTreeSet<Hash>,
}

/// Every content hash that was ever successfully imported.
///
/// Append-only: hashes are added but never removed, not even when the book
/// that carried them is deleted, so a file that was imported once is
/// recognised forever after.
///
/// Persisted as `{"hashes": [...]}`.
#[derive(Debug)]
pub struct HashLedger {
    path: PathBuf,
    hashes: BTreeSet<Hash>,
    /// Hash count at the last load or save.
    persisted: usize,
}

impl HashLedger {
    /// An empty ledger that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), hashes: BTreeSet::new(), persisted: 0 }
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No hash ledger on disk yet; starting empty");
                return Ok(Self::new(path));
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io(path)),
        };
        let document: LedgerDocument = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData("hash ledger"))?;
        let persisted = document.hashes.len();
        tracing::debug!(hashes = persisted, "Loaded hash ledger");
        Ok(Self { path, hashes: document.hashes, persisted })
    }

    /// Whether `hash` was ever imported. Malformed hashes are never in the
    /// ledger; this never fails.
    pub fn is_in(&self, hash: &str) -> bool {
        hash.parse::<Hash>().is_ok_and(|hash| self.hashes.contains(&hash))
    }

    /// Whether an already-validated `hash` was ever imported.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.hashes.contains(hash)
    }

    /// Record `hash`, returning whether it was new.
    ///
    /// Fails with [`ErrorKind::InvalidHash`] if `hash` isn't 64 hex characters.
    pub fn add(&mut self, hash: &str) -> Result<bool> {
        let hash: Hash = hash.parse()?;
        Ok(self.insert(hash))
    }

    /// Record an already-validated `hash`, returning whether it was new.
    pub fn insert(&mut self, hash: Hash) -> bool {
        self.hashes.insert(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the ledger to disk, returning whether a write happened.
    ///
    /// Skipped when the hash count hasn't changed since the last load or
    /// save. Hashes are only ever appended, so an unchanged count means
    /// unchanged content.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn save(&mut self) -> Result<bool> {
        if self.hashes.len() == self.persisted {
            return Ok(false);
        }
        let document = LedgerDocument { hashes: self.hashes.clone() };
        let bytes = serde_json::to_vec_pretty(&document).or_raise(|| ErrorKind::InvalidData("hash ledger"))?;
        write_atomically(&self.path, &bytes).await?;
        tracing::debug!(hashes = self.hashes.len(), added = self.hashes.len() - self.persisted, "Saved hash ledger");
        self.persisted = self.hashes.len();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_add_is_idempotent() {
        let mut ledger = HashLedger::new("unused.json");
        assert!(ledger.add(VALID).unwrap());
        assert!(!ledger.add(VALID).unwrap());
        assert!(!ledger.add(&VALID.to_uppercase()).unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_add_rejects_malformed() {
        let mut ledger = HashLedger::new("unused.json");
        let err = ledger.add("abc123").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidHash(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_is_in_is_total() {
        let mut ledger = HashLedger::new("unused.json");
        assert!(!ledger.is_in(VALID));
        assert!(!ledger.is_in(""));
        assert!(!ledger.is_in("definitely not a hash"));
        ledger.add(VALID).unwrap();
        assert!(ledger.is_in(VALID));
        assert!(ledger.is_in(&VALID.to_uppercase()));
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::load(dir.path().join("hashes.json")).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        let mut ledger = HashLedger::load(&path).await.unwrap();
        ledger.add(VALID).unwrap();
        ledger.insert(Hash::of(b"second"));
        assert!(ledger.save().await.unwrap());

        let reloaded = HashLedger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_in(VALID));
        assert!(reloaded.contains(&Hash::of(b"second")));

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["hashes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_skipped_when_count_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        let mut ledger = HashLedger::load(&path).await.unwrap();
        assert!(!ledger.save().await.unwrap());
        assert!(!path.exists());
        ledger.add(VALID).unwrap();
        assert!(ledger.save().await.unwrap());
        assert!(!ledger.save().await.unwrap());
        ledger.add(VALID).unwrap();
        assert!(!ledger.save().await.unwrap());
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        std::fs::write(&path, r#"{"hashes": ["nope"]}"#).unwrap();
        let err = HashLedger::load(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }
}
