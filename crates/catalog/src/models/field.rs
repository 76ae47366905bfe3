use super::{Book, Progress, Series, normalize_isbn};
use crate::error::{Error, ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 2100;

/// Names of the fields a user may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Title,
    Authors,
    Year,
    Language,
    Isbn,
    Description,
    Tags,
    Series,
    Progress,
}
impl FieldName {
    pub const ALL: [Self; 9] = [
        Self::Title,
        Self::Authors,
        Self::Year,
        Self::Language,
        Self::Isbn,
        Self::Description,
        Self::Tags,
        Self::Series,
        Self::Progress,
    ];

    fn as_static(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Authors => "authors",
            Self::Year => "year",
            Self::Language => "language",
            Self::Isbn => "isbn",
            Self::Description => "description",
            Self::Tags => "tags",
            Self::Series => "series",
            Self::Progress => "progress",
        }
    }
}
impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_static())
    }
}
impl FromStr for FieldName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = match lowered.as_str() {
            "author" => Self::Authors,
            "tag" => Self::Tags,
            other => match Self::ALL.into_iter().find(|f| f.as_static() == other) {
                Some(name) => name,
                None => exn::bail!(ErrorKind::InvalidField { field: "field", reason: format!("unknown field {s:?}") }),
            },
        };
        Ok(name)
    }
}

/// A validated change to one field of a [`Book`].
///
/// Optional fields are cleared by an empty input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditableField {
    Title(String),
    Authors(Vec<String>),
    Year(Option<i32>),
    Language(Option<String>),
    Isbn(Option<String>),
    Description(Option<String>),
    Tags(Vec<String>),
    Series(Option<Series>),
    Progress(Progress),
}

fn invalid(field: FieldName, reason: impl Into<String>) -> Error {
    Error::from(ErrorKind::InvalidField { field: field.as_static(), reason: reason.into() })
}

fn optional(input: &str) -> Option<&str> {
    Some(input.trim()).filter(|s| !s.is_empty())
}

fn isbn_checksum_ok(digits: &str) -> bool {
    let values: Vec<u32> = digits.chars().map(|c| c.to_digit(10).unwrap_or(10)).collect();
    match values.len() {
        10 => {
            // `X` is only allowed as the check digit.
            if values[..9].contains(&10) {
                return false;
            }
            values.iter().zip((1..=10).rev()).map(|(v, w)| v * w).sum::<u32>() % 11 == 0
        },
        13 => {
            if values.contains(&10) {
                return false;
            }
            values.iter().zip([1, 3].into_iter().cycle()).map(|(v, w)| v * w).sum::<u32>() % 10 == 0
        },
        _ => false,
    }
}

impl EditableField {
    /// Parse and validate user input for `field`.
    ///
    /// ```
    /// use shelf_catalog::{EditableField, FieldName};
    /// let field = EditableField::parse(FieldName::Authors, "Terry Pratchett & Neil Gaiman").unwrap();
    /// assert_eq!(field, EditableField::Authors(vec!["Terry Pratchett".into(), "Neil Gaiman".into()]));
    /// assert!(EditableField::parse(FieldName::Title, "   ").is_err());
    /// ```
    pub fn parse(field: FieldName, input: &str) -> Result<Self> {
        let parsed = match field {
            FieldName::Title => match optional(input) {
                Some(title) => Self::Title(title.to_string()),
                None => return Err(invalid(field, "title cannot be empty")),
            },
            FieldName::Authors => {
                let authors: Vec<String> =
                    input.split(['&', ';']).map(str::trim).filter(|a| !a.is_empty()).map(String::from).collect();
                if authors.is_empty() {
                    return Err(invalid(field, "at least one author is required"));
                }
                Self::Authors(authors)
            },
            FieldName::Year => match optional(input) {
                None => Self::Year(None),
                Some(year) => match year.parse::<i32>() {
                    Ok(year) if (MIN_YEAR..=MAX_YEAR).contains(&year) => Self::Year(Some(year)),
                    _ => return Err(invalid(field, format!("{year:?} is not a year between {MIN_YEAR} and {MAX_YEAR}"))),
                },
            },
            FieldName::Language => match optional(input) {
                None => Self::Language(None),
                Some(lang) if (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic()) => {
                    Self::Language(Some(lang.to_ascii_lowercase()))
                },
                Some(lang) => return Err(invalid(field, format!("{lang:?} is not a 2 or 3 letter language code"))),
            },
            FieldName::Isbn => match optional(input) {
                None => Self::Isbn(None),
                Some(isbn) => {
                    let digits = normalize_isbn(isbn);
                    let stray = isbn.chars().any(|c| !(c.is_ascii_digit() || matches!(c, 'x' | 'X' | '-' | ' ')));
                    if stray || !isbn_checksum_ok(&digits) {
                        return Err(invalid(field, format!("{isbn:?} is not a valid ISBN-10 or ISBN-13")));
                    }
                    Self::Isbn(Some(digits))
                },
            },
            FieldName::Description => Self::Description(optional(input).map(String::from)),
            FieldName::Tags => {
                let mut tags: Vec<String> = Vec::new();
                for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                        tags.push(tag.to_string());
                    }
                }
                Self::Tags(tags)
            },
            FieldName::Series => match optional(input) {
                None => Self::Series(None),
                Some(series) => match series.rsplit_once('#') {
                    Some((name, position)) if !name.trim().is_empty() => match position.trim().parse::<u32>() {
                        Ok(position) => Self::Series(Some(Series { name: name.trim().to_string(), position: Some(position) })),
                        Err(_) => return Err(invalid(field, format!("{position:?} is not a series position"))),
                    },
                    Some(_) => return Err(invalid(field, "series name cannot be empty")),
                    None => Self::Series(Some(Series { name: series.to_string(), position: None })),
                },
            },
            FieldName::Progress => match input.trim().to_ascii_lowercase().as_str() {
                "unread" => Self::Progress(Progress::Unread),
                "reading" => Self::Progress(Progress::Reading),
                "read" => Self::Progress(Progress::Read),
                other => return Err(invalid(field, format!("{other:?} is not one of unread, reading, read"))),
            },
        };
        Ok(parsed)
    }

    pub fn name(&self) -> FieldName {
        match self {
            Self::Title(_) => FieldName::Title,
            Self::Authors(_) => FieldName::Authors,
            Self::Year(_) => FieldName::Year,
            Self::Language(_) => FieldName::Language,
            Self::Isbn(_) => FieldName::Isbn,
            Self::Description(_) => FieldName::Description,
            Self::Tags(_) => FieldName::Tags,
            Self::Series(_) => FieldName::Series,
            Self::Progress(_) => FieldName::Progress,
        }
    }

    /// Whether the change alters anything that a canonical filename is
    /// rendered from.
    pub fn affects_filename(&self) -> bool {
        !matches!(self, Self::Description(_) | Self::Tags(_) | Self::Progress(_))
    }

    /// Write the value into `book`, returning whether it changed.
    pub fn apply(self, book: &mut Book) -> bool {
        let before = book.clone();
        let metadata = &mut book.metadata;
        match self {
            Self::Title(title) => metadata.title = title,
            Self::Authors(authors) => metadata.authors = authors,
            Self::Year(year) => metadata.year = year,
            Self::Language(language) => metadata.language = language,
            Self::Isbn(isbn) => metadata.isbn = isbn,
            Self::Description(description) => metadata.description = description,
            Self::Tags(tags) => metadata.tags = tags,
            Self::Series(series) => metadata.series = series,
            Self::Progress(progress) => book.progress = progress,
        }
        *book != before
    }
}
