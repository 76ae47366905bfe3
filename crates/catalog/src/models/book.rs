use super::Metadata;
use crate::hash::Hash;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Which of the two copy slots of a [`Book`] a file occupies.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopySlot {
    /// Purchased, authoritative; never replaced by a non-retail file.
    #[display("retail")]
    Retail,
    /// Acquired elsewhere; dropped as soon as a retail copy arrives.
    #[display("non-retail")]
    NonRetail,
}
impl CopySlot {
    pub fn from_retail(retail: bool) -> Self {
        match retail {
            true => Self::Retail,
            false => Self::NonRetail,
        }
    }

    pub fn is_retail(self) -> bool {
        self == Self::Retail
    }

    pub fn other(self) -> Self {
        match self {
            Self::Retail => Self::NonRetail,
            Self::NonRetail => Self::Retail,
        }
    }
}

/// One file on disk holding a [`Book`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalCopy {
    /// Relative to the library root.
    pub path: PathBuf,
    pub hash: Hash,
    /// Set by the user when a better file should replace this one on the
    /// next import.
    #[serde(default)]
    pub needs_replacement: bool,
}
impl PhysicalCopy {
    pub fn new(path: impl Into<PathBuf>, hash: Hash) -> Self {
        Self { path: path.into(), hash, needs_replacement: false }
    }
}

/// Reading state of a book.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    #[default]
    #[display("unread")]
    Unread,
    #[display("reading")]
    Reading,
    #[display("read")]
    Read,
}

/// A logical work, owning at most one retail and one non-retail copy.
///
/// A book without any copy doesn't belong in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub metadata: Metadata,
    #[serde(default)]
    pub progress: Progress,
    #[serde(with = "time::serde::rfc3339")]
    pub added: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retail: Option<PhysicalCopy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_retail: Option<PhysicalCopy>,
}

impl Book {
    pub fn new(id: u64, metadata: Metadata, slot: CopySlot, copy: PhysicalCopy) -> Self {
        let mut book = Self {
            id,
            metadata,
            progress: Progress::default(),
            // Whole seconds; RFC 3339 round trips are then exact.
            added: OffsetDateTime::now_utc().replace_nanosecond(0).unwrap_or_else(|_| OffsetDateTime::now_utc()),
            retail: None,
            non_retail: None,
        };
        book.set_copy(slot, copy);
        book
    }

    pub fn copy(&self, slot: CopySlot) -> Option<&PhysicalCopy> {
        match slot {
            CopySlot::Retail => self.retail.as_ref(),
            CopySlot::NonRetail => self.non_retail.as_ref(),
        }
    }

    pub fn copy_mut(&mut self, slot: CopySlot) -> Option<&mut PhysicalCopy> {
        match slot {
            CopySlot::Retail => self.retail.as_mut(),
            CopySlot::NonRetail => self.non_retail.as_mut(),
        }
    }

    /// Put `copy` in `slot`, returning whatever was there before.
    pub fn set_copy(&mut self, slot: CopySlot, copy: PhysicalCopy) -> Option<PhysicalCopy> {
        match slot {
            CopySlot::Retail => self.retail.replace(copy),
            CopySlot::NonRetail => self.non_retail.replace(copy),
        }
    }

    pub fn take_copy(&mut self, slot: CopySlot) -> Option<PhysicalCopy> {
        match slot {
            CopySlot::Retail => self.retail.take(),
            CopySlot::NonRetail => self.non_retail.take(),
        }
    }

    /// Occupied slots, retail first.
    pub fn copies(&self) -> impl Iterator<Item = (CopySlot, &PhysicalCopy)> {
        [(CopySlot::Retail, self.retail.as_ref()), (CopySlot::NonRetail, self.non_retail.as_ref())]
            .into_iter()
            .filter_map(|(slot, copy)| copy.map(|c| (slot, c)))
    }

    /// The copy that represents the book: retail when there is one.
    pub fn primary(&self) -> Option<&PhysicalCopy> {
        self.retail.as_ref().or(self.non_retail.as_ref())
    }

    pub fn has_copies(&self) -> bool {
        self.retail.is_some() || self.non_retail.is_some()
    }

    pub fn holds_hash(&self, hash: &str) -> bool {
        self.copies().any(|(_, c)| c.hash.as_str().eq_ignore_ascii_case(hash))
    }

    pub fn holds_path(&self, path: &Path) -> bool {
        self.copies().any(|(_, c)| c.path == path)
    }
}
