use shelf_catalog::Hash;
use std::path::PathBuf;

/// A file found by a scan, classified against the ledger and the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubCandidate {
    /// Relative to the scanned directory.
    pub path: PathBuf,
    pub hash: Hash,
    /// The hash is in the ledger.
    pub imported: bool,
    /// The hash is in the ledger but no book holds a copy with it any more.
    pub imported_but_missing: bool,
}
impl EpubCandidate {
    pub fn is_new(&self) -> bool {
        !self.imported
    }

    pub fn is_importable(&self) -> bool {
        self.is_new() || self.imported_but_missing
    }
}

/// Every candidate of one scan, ordered by path.
///
/// The partitions are derived from the single list on demand, so
/// [`importable`](Self::importable) is always exactly
/// [`new_files`](Self::new_files) followed by [`missing`](Self::missing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    candidates: Vec<EpubCandidate>,
}
impl Candidates {
    pub fn new(mut candidates: Vec<EpubCandidate>) -> Self {
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        Self { candidates }
    }

    pub fn all(&self) -> &[EpubCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates whose hash was never imported.
    pub fn new_files(&self) -> impl Iterator<Item = &EpubCandidate> {
        self.candidates.iter().filter(|c| c.is_new())
    }

    /// Candidates imported before but no longer held by any book.
    pub fn missing(&self) -> impl Iterator<Item = &EpubCandidate> {
        self.candidates.iter().filter(|c| c.imported_but_missing)
    }

    pub fn importable(&self) -> impl Iterator<Item = &EpubCandidate> {
        self.new_files().chain(self.missing())
    }
}
impl IntoIterator for Candidates {
    type Item = EpubCandidate;
    type IntoIter = std::vec::IntoIter<EpubCandidate>;
    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, imported: bool, missing: bool) -> EpubCandidate {
        EpubCandidate { path: path.into(), hash: Hash::of(path), imported, imported_but_missing: missing }
    }

    #[test]
    fn test_partitions() {
        let candidates = Candidates::new(vec![
            candidate("c.epub", true, false),
            candidate("b.epub", true, true),
            candidate("a.epub", false, false),
        ]);
        let paths = |it: Vec<&EpubCandidate>| it.into_iter().map(|c| c.path.to_string_lossy().into_owned()).collect::<Vec<_>>();
        assert_eq!(paths(candidates.all().iter().collect()), vec!["a.epub", "b.epub", "c.epub"]);
        assert_eq!(paths(candidates.new_files().collect()), vec!["a.epub"]);
        assert_eq!(paths(candidates.missing().collect()), vec!["b.epub"]);
        assert_eq!(paths(candidates.importable().collect()), vec!["a.epub", "b.epub"]);
    }
}
