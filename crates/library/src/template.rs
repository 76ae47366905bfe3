//! Canonical filenames for library copies.
//!
//! Converts [`Metadata`] into deterministic relative paths using
//! user-configured [upon] templates. The template syntax follows upon's
//! Mustache-like conventions (`{{ variable }}`, `{{ value|formatter }}`),
//! extended with path-friendly helpers:
//!
//! - **`slug`**: Converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`**: Truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable   | Type             | Description                                  |
//! |------------|------------------|----------------------------------------------|
//! | `author`   | `String`         | First author, or `Unknown`                   |
//! | `authors`  | `String`         | Every author joined with ` & `               |
//! | `title`    | `String`         | Title                                        |
//! | `year`     | `Option<i32>`    | Publication year                             |
//! | `language` | `Option<String>` | Language code                                |
//! | `series`   | `Option<String>` | Series name                                  |
//! | `position` | `Option<u32>`    | Position within the series                   |
//! | `isbn`     | `Option<String>` | ISBN digits                                  |
//!
//! # Example
//!
//! ```
//! use shelf_catalog::{CopySlot, Metadata};
//! use shelf_library::PathGenerator;
//!
//! let generator: PathGenerator = "{{ author }}/{{ title }}".parse().unwrap();
//! let metadata = Metadata::new("Dune: Messiah?", ["Frank Herbert"]);
//! let path = generator.generate_for(&metadata, CopySlot::Retail).unwrap();
//! assert_eq!(path.to_str(), Some("Frank Herbert/Dune_ Messiah_ [retail].epub"));
//! ```

use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use regex::Regex;
use shelf_catalog::{CopySlot, Metadata};
use shelf_storage::validate_path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::instrument;
use upon::{Engine, Template};

const EXTENSION: &str = "epub";
const RETAIL_SUFFIX: &str = " [retail]";

/// Characters that are illegal in filenames on at least one common platform,
/// plus control characters.
static ILLEGAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"\\|?*\x00-\x1f\x7f]"#).unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Generates deterministic relative paths from [`Metadata`] and a
/// user-defined template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    /// Compiles `s`, failing with [`ErrorKind::Template`] if it is blank or
    /// syntactically invalid.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().is_empty() {
            exn::bail!(ErrorKind::Template);
        }
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the template, returning the sanitized path without extension.
    #[instrument(skip_all, fields(title = %metadata.title))]
    pub fn generate(&self, metadata: &Metadata) -> Result<String> {
        let rendered =
            self.template.render(&self.engine, Self::parameters(metadata)).to_string().or_raise(|| ErrorKind::Template)?;
        Self::normalize(&rendered)
    }

    /// The full relative path of a copy in `slot`: the rendered template,
    /// ` [retail]` for retail copies, and the `.epub` extension.
    pub fn generate_for(&self, metadata: &Metadata, slot: CopySlot) -> Result<PathBuf> {
        let stem = self.generate(metadata)?;
        let suffix = if slot.is_retail() { RETAIL_SUFFIX } else { "" };
        Ok(PathBuf::from(format!("{stem}{suffix}.{EXTENSION}")))
    }

    /// Replaces illegal characters, collapses whitespace, drops empty and
    /// dot-only segments, then validates via [`shelf_storage::validate_path`].
    fn normalize(rendered: &str) -> Result<String> {
        let segments: Vec<String> = rendered
            .split('/')
            .map(|segment| {
                let replaced = ILLEGAL.replace_all(segment, "_");
                let collapsed = WHITESPACE.replace_all(&replaced, " ");
                collapsed.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
            })
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            exn::bail!(ErrorKind::Template);
        }
        let path = segments.join("/");
        validate_path(&path)
            .or_raise(|| ErrorKind::Template)
            .and_then(|p| p.to_str().map(str::to_string).ok_or_raise(|| ErrorKind::Template))
    }

    /// Builds the [`upon::Value`] map exposed to the template engine.
    fn parameters(metadata: &Metadata) -> upon::Value {
        let author = metadata.authors.first().cloned().unwrap_or_else(|| "Unknown".to_string());
        upon::value! {
            author: author,
            authors: metadata.author_display(),
            title: &metadata.title,
            year: metadata.year,
            language: metadata.language.clone(),
            series: metadata.series.as_ref().map(|s| s.name.clone()),
            position: metadata.series.as_ref().and_then(|s| s.position),
            isbn: metadata.isbn.clone(),
        }
    }
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Custom formatter that converts strings to URL-safe slugs.
    ///
    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"hello"` becoming `-hello-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    /// Truncates a string to a maximum byte length at a character boundary.
    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    /// Registers the `slug` formatter and `truncate` function on the given engine.
    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shelf_catalog::Series;

    fn dune() -> Metadata {
        Metadata {
            year: Some(1965),
            language: Some("en".into()),
            series: Some(Series { name: "Dune".into(), position: Some(1) }),
            ..Metadata::new("Dune", ["Frank Herbert"])
        }
    }

    #[rstest]
    #[case("{{ author }}/{{ title }}", "Frank Herbert/Dune")]
    #[case("{{ author|slug }}/{{ year }}-{{ title|slug }}", "frank-herbert/1965-dune")]
    #[case("{{ series }} {{ position }} - {{ title }} ({{ language }})", "Dune 1 - Dune (en)")]
    #[case("{{ truncate(author, 5) }}/{{ title }}", "Frank/Dune")]
    #[case("{{ author|truncate: 5|slug }}", "frank")]
    #[case("  {{ author }} //  {{ title }}  ", "Frank Herbert/Dune")]
    fn test_generates(#[case] template: &str, #[case] expected: &str) {
        let generator: PathGenerator = template.parse().unwrap();
        assert_eq!(generator.generate(&dune()).unwrap(), expected);
    }

    #[test]
    fn test_missing_optional_values_render_empty() {
        let generator: PathGenerator = "{{ author }}/{{ title }} {{ year }}".parse().unwrap();
        let metadata = Metadata::new("Untitled", Vec::<String>::new());
        assert_eq!(generator.generate(&metadata).unwrap(), "Unknown/Untitled");
    }

    #[test]
    fn test_illegal_characters_are_replaced() {
        let generator: PathGenerator = "{{ title }}".parse().unwrap();
        let metadata = Metadata::new("What? <Really>: \"yes\" | no*\\", ["A"]);
        assert_eq!(generator.generate(&metadata).unwrap(), "What_ _Really__ _yes_ _ no__");
    }

    #[test]
    fn test_traversal_is_neutralised() {
        let generator: PathGenerator = "{{ author }}/{{ title }}".parse().unwrap();
        let metadata = Metadata::new("passwd", [".."]);
        assert_eq!(generator.generate(&metadata).unwrap(), "passwd");
    }

    #[test]
    fn test_retail_suffix_and_extension() {
        let generator: PathGenerator = "{{ author }}/{{ title }}".parse().unwrap();
        let retail = generator.generate_for(&dune(), CopySlot::Retail).unwrap();
        let non_retail = generator.generate_for(&dune(), CopySlot::NonRetail).unwrap();
        assert_eq!(retail, PathBuf::from("Frank Herbert/Dune [retail].epub"));
        assert_eq!(non_retail, PathBuf::from("Frank Herbert/Dune.epub"));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("{{ unclosed")]
    fn test_invalid_templates(#[case] template: &str) {
        let err = template.parse::<PathGenerator>().err().unwrap();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[test]
    fn test_rendering_nothing_is_an_error() {
        let generator: PathGenerator = "{{ isbn }}".parse().unwrap();
        let err = generator.generate(&dune()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }
}
