//! The moving parts of a shelf library: scanning directories for EPUB files,
//! deciding what each file means for the catalog, carrying that out, and
//! keeping the library root tidy afterwards.
//!
//! Most callers want a [`Library`] session, which owns the lock and every
//! piece of persisted state for the length of one command.

mod conflict;
pub mod error;
pub mod external;
pub mod import;
mod lock;
pub mod refresh;
pub mod scan;
mod session;
mod template;

pub use crate::lock::LockGuard;
pub use crate::session::{Collaborators, Library};
pub use crate::template::PathGenerator;

/// Upper bound on storage operations in flight at once.
pub(crate) const MAX_PROCESS_CONCURRENCY: usize = 100;
