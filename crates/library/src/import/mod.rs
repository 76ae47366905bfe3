//! Bringing scanned candidates into the library.
//!
//! Each candidate is matched with at most one existing book (by content
//! hash, then by library path, then by similar metadata), [`resolve`]d into
//! a [`Decision`], and the decision is carried out against the library root,
//! the catalog and the hash ledger in that order. Candidates are processed
//! one at a time, so a file matching a book created earlier in the same batch
//! attaches to that book.

mod apply;
pub mod error;
mod resolve;

pub(crate) use self::apply::Importer;
pub use self::resolve::{Decision, resolve};
use derive_more::Display;
use shelf_catalog::CopySlot;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};
use std::path::PathBuf;

/// What happened to one candidate.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Outcome {
    #[display("created book #{id} at {}", path.display())]
    Created { id: u64, path: PathBuf },
    /// Filled an empty slot. `trumped` is set when a retail copy pushed out
    /// the non-retail one.
    #[display("attached {slot} copy to book #{id}")]
    Attached { id: u64, slot: CopySlot, path: PathBuf, trumped: bool },
    #[display("replaced {slot} copy of book #{id}")]
    Replaced { id: u64, slot: CopySlot, path: PathBuf },
    #[display("duplicate of book #{id}")]
    Duplicate { id: u64 },
    #[display("book #{id} already has a retail copy")]
    Superseded { id: u64 },
    /// The user refused a destructive step.
    #[display("declined")]
    Declined,
}

impl Outcome {
    /// Whether the candidate's bytes ended up in the library.
    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Attached { .. } | Self::Replaced { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::Superseded { .. })
    }

    /// The same outcome with the imported copy at `path`.
    pub(crate) fn moved_to(self, path: PathBuf) -> Self {
        match self {
            Self::Created { id, .. } => Self::Created { id, path },
            Self::Attached { id, slot, trumped, .. } => Self::Attached { id, slot, path, trumped },
            Self::Replaced { id, slot, .. } => Self::Replaced { id, slot, path },
            other => other,
        }
    }
}

/// Per-candidate results of one import run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub outcomes: Vec<(PathBuf, Outcome)>,
    /// Candidates aborted by an error; see the log for details.
    pub failed: Vec<PathBuf>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_imported()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_rejected()).count()
    }

    pub fn declined(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == Outcome::Declined).count()
    }

    /// The outcome for the candidate at `path`, if it was processed without
    /// error.
    pub fn outcome(&self, path: impl Into<PathBuf>) -> Option<&Outcome> {
        let path = path.into();
        self.outcomes.iter().find(|(p, _)| *p == path).map(|(_, o)| o)
    }
}

impl FmtDisplay for ImportReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} imported, {} rejected, {} declined, {} failed",
            self.imported(),
            self.rejected(),
            self.declined(),
            self.failed.len()
        )
    }
}
