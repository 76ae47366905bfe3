use crate::error::{ErrorKind, Result};
use crate::models::{Book, Metadata};
use exn::OptionExt;
use std::collections::BTreeMap;
use std::path::Path;

/// Operations the import engine needs from a set of books.
pub trait Collection {
    /// All books, ordered by id.
    fn books(&self) -> Box<dyn Iterator<Item = &Book> + '_>;
    fn get(&self, id: u64) -> Option<&Book>;
    fn get_mut(&mut self, id: u64) -> Option<&mut Book>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The book holding a copy with content `hash`.
    fn find_by_hash(&self, hash: &str) -> Option<&Book> {
        self.books().find(|book| book.holds_hash(hash))
    }

    /// The book holding a copy stored at `path`, relative to the library root.
    fn find_by_path(&self, path: &Path) -> Option<&Book> {
        self.books().find(|book| book.holds_path(path))
    }

    /// The first book (by id) describing the same work as `metadata`.
    fn find_similar(&self, metadata: &Metadata) -> Option<&Book> {
        self.books().find(|book| book.metadata.is_similar(metadata))
    }

    /// The id the next inserted book will receive.
    fn next_id(&self) -> u64;

    /// Insert `book`, failing with [`ErrorKind::DuplicateId`] when its id is
    /// taken.
    fn insert(&mut self, book: Book) -> Result<()>;

    fn remove(&mut self, id: u64) -> Option<Book>;

    /// What changed going from `old` to `self`.
    fn diff(&self, old: &Self) -> BookDiff
    where
        Self: Sized,
    {
        let mut diff = BookDiff::default();
        for after in self.books() {
            match old.get(after.id) {
                None => diff.added.push(after.clone()),
                Some(before) if before != after => diff.modified.push((before.clone(), after.clone())),
                Some(_) => {},
            }
        }
        diff.removed = old.books().filter(|b| self.get(b.id).is_none()).cloned().collect();
        diff
    }
}

/// The in-memory catalog: every book keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Books {
    books: BTreeMap<u64, Book>,
    /// Highest id ever handed out; ids of removed books aren't reused.
    high_water: u64,
}

impl Books {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(books: Vec<Book>) -> Result<Self> {
        let mut collection = Self::new();
        for book in books {
            collection.insert(book)?;
        }
        Ok(collection)
    }

    pub fn to_vec(&self) -> Vec<Book> {
        self.books.values().cloned().collect()
    }

    /// The highest id ever handed out, including ids of removed books.
    pub fn last_id(&self) -> u64 {
        self.high_water
    }

    /// Never hand out ids up to `last_id`, even if no book carries them.
    pub fn with_last_id(mut self, last_id: u64) -> Self {
        self.high_water = self.high_water.max(last_id);
        self
    }

    /// Ids, ordered.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.books.keys().copied()
    }

    /// Remove every book without copies, returning them.
    pub fn remove_empty(&mut self) -> Vec<Book> {
        let empty: Vec<u64> = self.books.values().filter(|b| !b.has_copies()).map(|b| b.id).collect();
        empty.into_iter().filter_map(|id| self.books.remove(&id)).collect()
    }
}

impl Collection for Books {
    fn books(&self) -> Box<dyn Iterator<Item = &Book> + '_> {
        Box::new(self.books.values())
    }

    fn get(&self, id: u64) -> Option<&Book> {
        self.books.get(&id)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut Book> {
        self.books.get_mut(&id)
    }

    fn len(&self) -> usize {
        self.books.len()
    }

    fn next_id(&self) -> u64 {
        let max = self.books.keys().next_back().copied().unwrap_or(0);
        max.max(self.high_water) + 1
    }

    fn insert(&mut self, book: Book) -> Result<()> {
        if self.books.contains_key(&book.id) {
            exn::bail!(ErrorKind::DuplicateId(book.id));
        }
        self.high_water = self.high_water.max(book.id);
        self.books.insert(book.id, book);
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Option<Book> {
        self.books.remove(&id)
    }
}

/// One book-level change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookChange<'a> {
    Added(&'a Book),
    Modified { before: &'a Book, after: &'a Book },
    Removed(&'a Book),
}

/// Difference between two [`Books`] snapshots, keyed by id.
///
/// A book present in both snapshots with different content is modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDiff {
    pub added: Vec<Book>,
    pub modified: Vec<(Book, Book)>,
    pub removed: Vec<Book>,
}

impl BookDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn changes(&self) -> impl Iterator<Item = BookChange<'_>> {
        let added = self.added.iter().map(BookChange::Added);
        let modified = self.modified.iter().map(|(before, after)| BookChange::Modified { before, after });
        let removed = self.removed.iter().map(BookChange::Removed);
        removed.chain(modified).chain(added)
    }

    /// Rebuild the newer snapshot from the one the diff was taken against.
    pub fn apply(&self, old: &Books) -> Result<Books> {
        let mut new = old.clone();
        for book in &self.removed {
            new.remove(book.id).ok_or_raise(|| ErrorKind::BookNotFound(book.id))?;
        }
        for (before, after) in &self.modified {
            let slot = new.get_mut(before.id).ok_or_raise(|| ErrorKind::BookNotFound(before.id))?;
            *slot = after.clone();
        }
        for book in &self.added {
            new.insert(book.clone())?;
        }
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::models::{CopySlot, PhysicalCopy, Progress};

    fn book(id: u64, title: &str) -> Book {
        let copy = PhysicalCopy::new(format!("{title}.epub"), Hash::of(title));
        Book::new(id, Metadata::new(title, ["Author"]), CopySlot::NonRetail, copy)
    }

    #[test]
    fn test_next_id_is_never_reused() {
        let mut books = Books::new();
        assert_eq!(books.next_id(), 1);
        books.insert(book(1, "a")).unwrap();
        books.insert(book(2, "b")).unwrap();
        assert_eq!(books.next_id(), 3);
        books.remove(2);
        assert_eq!(books.next_id(), 3);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Books::from_vec(vec![book(1, "a"), book(1, "b")]).unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateId(1));
    }

    #[test]
    fn test_lookups() {
        let books = Books::from_vec(vec![book(1, "Dune"), book(2, "Emma")]).unwrap();
        assert_eq!(books.find_by_hash(Hash::of("Emma").as_str()).map(|b| b.id), Some(2));
        assert_eq!(books.find_by_path(Path::new("Dune.epub")).map(|b| b.id), Some(1));
        assert_eq!(books.find_similar(&Metadata::new("EMMA", ["author"])).map(|b| b.id), Some(2));
        assert!(books.find_by_hash("nope").is_none());
    }

    #[test]
    fn test_diff_partitions_and_applies() {
        let old = Books::from_vec(vec![book(1, "keep"), book(2, "change"), book(3, "drop")]).unwrap();
        let mut new = old.clone();
        new.get_mut(2).unwrap().progress = Progress::Read;
        new.remove(3);
        new.insert(book(4, "add")).unwrap();

        let diff = new.diff(&old);
        assert_eq!(diff.added.iter().map(|b| b.id).collect::<Vec<_>>(), vec![4]);
        assert_eq!(diff.modified.iter().map(|(b, a)| (b.id, a.id)).collect::<Vec<_>>(), vec![(2, 2)]);
        assert_eq!(diff.removed.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff.apply(&old).unwrap().to_vec(), new.to_vec());
        assert!(new.diff(&new).is_empty());
    }

    #[test]
    fn test_diff_between_unrelated_snapshots() {
        let a = Books::from_vec(vec![book(1, "x"), book(5, "y")]).unwrap();
        let b = Books::from_vec(vec![book(2, "x"), book(5, "z")]).unwrap();
        let diff = b.diff(&a);
        assert_eq!(diff.apply(&a).unwrap().to_vec(), b.to_vec());
        let reverse = a.diff(&b);
        assert_eq!(reverse.apply(&b).unwrap().to_vec(), a.to_vec());
    }

    #[test]
    fn test_remove_empty() {
        let mut books = Books::from_vec(vec![book(1, "a"), book(2, "b")]).unwrap();
        books.get_mut(1).unwrap().take_copy(CopySlot::NonRetail);
        let removed = books.remove_empty();
        assert_eq!(removed.len(), 1);
        assert_eq!(books.ids().collect::<Vec<_>>(), vec![2]);
    }
}
