use super::MetadataReader;
use crate::external::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use shelf_catalog::{EditableField, FieldName, Metadata};
use std::io::Cursor;

/// Reads the Dublin Core metadata of an EPUB container with the `epub` crate.
///
/// Parsing is synchronous and runs on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubReader;

#[async_trait]
impl MetadataReader for EpubReader {
    async fn read(&self, bytes: &[u8]) -> Result<Metadata> {
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || parse(bytes))
            .await
            .or_raise(|| ErrorKind::Unreadable("parser task failed".into()))?
    }
}

fn parse(bytes: Vec<u8>) -> Result<Metadata> {
    let doc = epub::doc::EpubDoc::from_reader(Cursor::new(bytes))
        .map_err(|e| exn::Exn::from(ErrorKind::Unreadable(e.to_string())))?;
    let field = |name: &str| doc.mdata(name).map(|m| m.value.trim().to_string()).filter(|v| !v.is_empty());

    let Some(title) = field("title") else {
        exn::bail!(ErrorKind::MissingTitle);
    };
    let authors = field("creator")
        .map(|creator| creator.split(['&', ';']).map(str::trim).filter(|a| !a.is_empty()).map(String::from).collect())
        .unwrap_or_default();
    // Dates come as `YYYY`, `YYYY-MM-DD` or a full timestamp.
    let year = field("date").and_then(|date| date.get(..4).and_then(|y| y.parse().ok()));
    // Only keep values that would survive a manual edit.
    let valid = |name: FieldName, value: Option<String>| {
        value.and_then(|v| EditableField::parse(name, &v).ok()).and_then(|field| match field {
            EditableField::Language(v) | EditableField::Isbn(v) => v,
            _ => None,
        })
    };
    let isbn = valid(FieldName::Isbn, field("identifier").map(|id| id.trim_start_matches("urn:isbn:").to_string()));
    Ok(Metadata {
        title,
        authors,
        year,
        language: valid(FieldName::Language, field("language")),
        isbn,
        description: field("description"),
        tags: field("subject").into_iter().collect(),
        series: None,
    })
}
