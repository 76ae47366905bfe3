//! Narrow interfaces to everything the import engine doesn't do itself:
//! reading metadata out of a container, asking a remote service, and asking
//! the user.

mod epub;
pub mod error;

pub use self::epub::EpubReader;
use crate::external::error::{ErrorKind, Result};
use async_trait::async_trait;
use derive_more::Display;
use shelf_catalog::{CopySlot, FieldName, Metadata};
use shelf_config::ImportConfig;
use std::path::PathBuf;

/// Extracts metadata from the raw bytes of an e-book.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, bytes: &[u8]) -> Result<Metadata>;
}

/// Enriches metadata from a remote bibliographic service.
#[async_trait]
pub trait OnlineLookup: Send + Sync {
    async fn search(&self, metadata: &Metadata, api_key: &str) -> Result<Metadata>;
}

/// Remote lookup switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl OnlineLookup for NoLookup {
    async fn search(&self, _metadata: &Metadata, _api_key: &str) -> Result<Metadata> {
        exn::bail!(ErrorKind::Unavailable);
    }
}

/// A destructive action awaiting the user's approval.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Replace the flagged copy in `slot` of book `id`.
    #[display("replace the {slot} copy of \"{title}\" (#{id})")]
    Replace { id: u64, title: String, slot: CopySlot },
    /// Import a file whose hash is known but that no book holds any more.
    #[display("re-import previously imported {}", path.display())]
    ReimportMissing { path: PathBuf },
}

/// Which of two conflicting values to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Local,
    Remote,
}

/// Questions asked of the user during an import.
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &Confirmation) -> bool;
    /// Offer `metadata` for correction, returning the result.
    fn edit_metadata(&self, metadata: Metadata) -> Metadata;
    fn choose(&self, field: FieldName, local: &str, remote: &str) -> Choice;
}

/// Answers every question from configuration without interaction.
#[derive(Debug, Clone, Default)]
pub struct Unattended {
    config: ImportConfig,
}
impl Unattended {
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }
}
impl Prompter for Unattended {
    fn confirm(&self, question: &Confirmation) -> bool {
        let answer = match question {
            Confirmation::Replace { .. } => self.config.replace_flagged,
            Confirmation::ReimportMissing { .. } => self.config.reimport_missing,
        };
        tracing::debug!(%question, answer, "Answered unattended confirmation");
        answer
    }

    fn edit_metadata(&self, metadata: Metadata) -> Metadata {
        metadata
    }

    fn choose(&self, _field: FieldName, _local: &str, _remote: &str) -> Choice {
        match self.config.prefer_remote {
            true => Choice::Remote,
            false => Choice::Local,
        }
    }
}

/// Fold `remote` into `local`: empty local fields take the remote value, and
/// each conflicting title, author list or year is settled by `prompter`.
pub fn merge_metadata(mut local: Metadata, remote: &Metadata, prompter: &dyn Prompter) -> Metadata {
    let remote_authors = remote.authors.join(" & ");
    if !remote.title.trim().is_empty()
        && !local.title.trim().is_empty()
        && local.title != remote.title
        && prompter.choose(FieldName::Title, &local.title, &remote.title) == Choice::Remote
    {
        local.title = remote.title.clone();
    }
    if !remote.authors.is_empty()
        && !local.authors.is_empty()
        && local.authors != remote.authors
        && prompter.choose(FieldName::Authors, &local.authors.join(" & "), &remote_authors) == Choice::Remote
    {
        local.authors = remote.authors.clone();
    }
    if let (Some(mine), Some(theirs)) = (local.year, remote.year)
        && mine != theirs
        && prompter.choose(FieldName::Year, &mine.to_string(), &theirs.to_string()) == Choice::Remote
    {
        local.year = Some(theirs);
    }
    local.fill_missing(remote);
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_lookup_is_unavailable() {
        let err = NoLookup.search(&Metadata::default(), "key").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unavailable);
    }

    #[test]
    fn test_unattended_answers_from_config() {
        let prompter = Unattended::new(ImportConfig { reimport_missing: true, ..Default::default() });
        assert!(prompter.confirm(&Confirmation::ReimportMissing { path: "a.epub".into() }));
        let replace = Confirmation::Replace { id: 1, title: "Dune".into(), slot: CopySlot::Retail };
        assert!(!prompter.confirm(&replace));
        assert_eq!(replace.to_string(), "replace the retail copy of \"Dune\" (#1)");
        assert_eq!(prompter.choose(FieldName::Title, "a", "b"), Choice::Local);
    }

    #[test]
    fn test_merge_fills_gaps_and_keeps_local_on_conflict() {
        let local = Metadata::new("Dune", ["Frank Herbert"]);
        let remote = Metadata { year: Some(1965), isbn: Some("9780441172719".into()), ..Metadata::new("DUNE", ["F. Herbert"]) };
        let merged = merge_metadata(local, &remote, &Unattended::default());
        assert_eq!(merged.title, "Dune");
        assert_eq!(merged.authors, vec!["Frank Herbert"]);
        assert_eq!(merged.year, Some(1965));
        assert_eq!(merged.isbn.as_deref(), Some("9780441172719"));
    }

    #[test]
    fn test_merge_prefers_remote_when_configured() {
        let prompter = Unattended::new(ImportConfig { prefer_remote: true, ..Default::default() });
        let local = Metadata { year: Some(1999), ..Metadata::new("dune", ["frank herbert"]) };
        let remote = Metadata { year: Some(1965), ..Metadata::new("Dune", ["Frank Herbert"]) };
        let merged = merge_metadata(local, &remote, &prompter);
        assert_eq!(merged, remote);
    }
}
