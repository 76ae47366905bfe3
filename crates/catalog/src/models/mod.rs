mod book;
mod field;
mod metadata;

pub use self::book::{Book, CopySlot, PhysicalCopy, Progress};
pub use self::field::{EditableField, FieldName};
pub use self::metadata::{Metadata, Series};
pub(crate) use self::metadata::normalize_isbn;
