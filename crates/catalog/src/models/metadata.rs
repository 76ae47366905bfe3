use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Membership of a book in a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// Descriptive metadata of a logical work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    /// In display order; may be empty when nothing is known.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// ISO-639 code, e.g. `en`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<Series>,
}

/// Case, whitespace and punctuation insensitive form used for matching.
fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Digits (and a trailing `X` check digit) of an ISBN.
pub(crate) fn normalize_isbn(isbn: &str) -> String {
    isbn.chars().filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X').map(|c| c.to_ascii_uppercase()).collect()
}

impl Metadata {
    pub fn new(title: impl Into<String>, authors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            title: title.into(),
            authors: authors.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Best-effort metadata from a filename stem such as
    /// `"Ursula K. Le Guin - A Wizard of Earthsea"`.
    ///
    /// ```
    /// use shelf_catalog::Metadata;
    /// let m = Metadata::from_file_stem("Frank Herbert - Dune");
    /// assert_eq!(m.authors, vec!["Frank Herbert"]);
    /// assert_eq!(m.title, "Dune");
    /// let m = Metadata::from_file_stem("untitled_draft");
    /// assert!(m.authors.is_empty());
    /// assert_eq!(m.title, "untitled draft");
    /// ```
    pub fn from_file_stem(stem: &str) -> Self {
        let cleaned = stem.replace('_', " ");
        match cleaned.split_once(" - ") {
            Some((author, title)) if !author.trim().is_empty() && !title.trim().is_empty() => {
                Self::new(title.trim(), [author.trim()])
            },
            _ => Self::new(cleaned.trim(), Vec::<String>::new()),
        }
    }

    /// Authors joined for display, e.g. `"Terry Pratchett & Neil Gaiman"`.
    pub fn author_display(&self) -> String {
        match self.authors.is_empty() {
            true => "Unknown".to_string(),
            false => self.authors.join(" & "),
        }
    }

    fn author_key(&self) -> BTreeSet<String> {
        self.authors.iter().map(|a| normalize(a)).filter(|a| !a.is_empty()).collect()
    }

    /// Whether `self` and `other` describe the same work.
    ///
    /// Equal ISBNs always match. Otherwise the title and the *set* of authors
    /// must be equal, ignoring case, whitespace and punctuation. Metadata
    /// without a title or without authors never matches by name.
    ///
    /// ```
    /// use shelf_catalog::Metadata;
    /// let a = Metadata::new("Good Omens", ["Terry Pratchett", "Neil Gaiman"]);
    /// let b = Metadata::new("good omens", ["Neil Gaiman", "Terry  Pratchett"]);
    /// assert!(a.is_similar(&b));
    /// assert!(!a.is_similar(&Metadata::new("Good Omens", ["Neil Gaiman"])));
    /// ```
    pub fn is_similar(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.isbn, &other.isbn) {
            let (a, b) = (normalize_isbn(a), normalize_isbn(b));
            if !a.is_empty() && a == b {
                return true;
            }
        }
        let title = normalize(&self.title);
        let authors = self.author_key();
        !title.is_empty() && !authors.is_empty() && title == normalize(&other.title) && authors == other.author_key()
    }

    /// Fill every empty field of `self` from `other`, returning whether
    /// anything changed.
    pub fn fill_missing(&mut self, other: &Self) -> bool {
        let before = self.clone();
        if self.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.tags.is_empty() {
            self.tags = other.tags.clone();
        }
        self.year = self.year.or(other.year);
        self.language = self.language.take().or_else(|| other.language.clone());
        self.isbn = self.isbn.take().or_else(|| other.isbn.clone());
        self.description = self.description.take().or_else(|| other.description.clone());
        self.series = self.series.take().or_else(|| other.series.clone());
        *self != before
    }
}
