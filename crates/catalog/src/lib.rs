//! The persisted state of a shelf library.
//!
//! # Architecture
//! Two independent artifacts are kept on disk:
//! - **The catalog**: every logical work ([`Book`]) with up to one retail and
//!   one non-retail [`PhysicalCopy`], stored as a single JSON document by
//!   [`CatalogStore`].
//! - **The hash ledger**: every content [`Hash`] that was ever imported,
//!   stored by [`HashLedger`]. The ledger outlives books on purpose; a file
//!   whose book was deleted is still recognised when it shows up again.

pub mod backup;
mod collection;
pub mod error;
mod hash;
mod ledger;
mod models;
mod store;

pub use crate::collection::{BookChange, BookDiff, Books, Collection};
pub use crate::hash::Hash;
pub use crate::ledger::HashLedger;
pub use crate::models::{Book, CopySlot, EditableField, FieldName, Metadata, PhysicalCopy, Progress, Series};
pub use crate::store::CatalogStore;
