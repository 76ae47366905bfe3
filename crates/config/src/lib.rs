//! Layered configuration for shelf.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults,
//! 2. `shelf.toml`, `shelf.yaml` or `shelf.json` in the user's config directory,
//! 3. an explicitly given file,
//! 4. `SHELF_*` environment variables, with `__` separating nested keys
//!    (`SHELF_IMPORT__REIMPORT_MISSING=true`).

pub mod error;

use crate::error::{Error, ErrorKind, Result};
use directories::{ProjectDirs, UserDirs};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const DEFAULT_TEMPLATE: &str = "{{ author }}/{{ title }}";
pub const DEFAULT_HASH_WORKERS: usize = 8;
const ENV_PREFIX: &str = "SHELF_";

/// How unattended imports answer questions that would otherwise be asked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Re-import files whose hash is known but no book holds any more.
    pub reimport_missing: bool,
    /// Replace copies flagged for replacement without asking.
    pub replace_flagged: bool,
    /// Take remote values over local ones when they conflict.
    pub prefer_remote: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    /// Remote lookup stays disabled without a key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the e-book files live.
    pub library_root: PathBuf,
    /// Where the catalog, ledger, index and lock file live.
    pub data_dir: PathBuf,
    /// Git repository catalog backups are committed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub filename_template: String,
    pub hash_workers: usize,
    pub import: ImportConfig,
    pub online: OnlineConfig,
}

impl Default for Config {
    fn default() -> Self {
        let library_root = UserDirs::new().map(|dirs| dirs.home_dir().join("Books")).unwrap_or_default();
        let data_dir = ProjectDirs::from("", "", "shelf").map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default();
        Self {
            library_root,
            data_dir,
            backup_dir: None,
            filename_template: DEFAULT_TEMPLATE.to_string(),
            hash_workers: DEFAULT_HASH_WORKERS,
            import: ImportConfig::default(),
            online: OnlineConfig::default(),
        }
    }
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let figment = match ext.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(figment)
}

impl Config {
    /// Load from every source, using the platform config directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_dir = ProjectDirs::from("", "", "shelf").map(|dirs| dirs.config_dir().to_path_buf());
        let figment = Self::figment(config_dir.as_deref(), explicit)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    /// Defaults, then the files in `config_dir`, then `explicit`. No
    /// environment.
    pub fn figment(config_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dir) = config_dir {
            figment = figment
                .merge(Toml::file(dir.join("shelf.toml")))
                .merge(Yaml::file(dir.join("shelf.yaml")))
                .merge(Json::file(dir.join("shelf.json")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = file_provider(figment, path)?;
        }
        Ok(figment)
    }

    #[instrument(skip_all)]
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| Error::from(ErrorKind::Malformed(e.to_string())))?;
        config.validate()?;
        tracing::debug!(root = %config.library_root.display(), data = %config.data_dir.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.library_root.is_absolute() {
            exn::bail!(ErrorKind::Invalid { field: "library_root", reason: "must be an absolute path" });
        }
        if self.data_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "data_dir", reason: "must not be empty" });
        }
        if self.hash_workers == 0 {
            exn::bail!(ErrorKind::Invalid { field: "hash_workers", reason: "must be at least 1" });
        }
        if self.filename_template.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "filename_template", reason: "must not be empty" });
        }
        Ok(())
    }

    /// Paths in the data directory are resolved against `library_root` when
    /// relative.
    fn data_path(&self, name: &str) -> PathBuf {
        self.library_root.join(&self.data_dir).join(name)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_path("catalog.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_path("hashes.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_path("index.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_path("shelf.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base() -> Config {
        Config { library_root: PathBuf::from("/books"), data_dir: PathBuf::from("/data"), ..Config::default() }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.filename_template, DEFAULT_TEMPLATE);
        assert_eq!(config.hash_workers, 8);
        assert!(!config.import.reimport_missing);
        assert!(config.online.api_key.is_none());
    }

    #[test]
    fn test_layers_override_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("shelf.toml"),
            "library_root = \"/from/toml\"\ndata_dir = \"/data\"\nhash_workers = 2\n[import]\nreimport_missing = true\n",
        )
        .unwrap();
        let explicit = dir.path().join("override.yaml");
        std::fs::write(&explicit, "hash_workers: 4\nonline:\n  api_key: secret\n").unwrap();

        let figment = Config::figment(Some(dir.path()), Some(&explicit)).unwrap();
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.library_root, PathBuf::from("/from/toml"));
        assert_eq!(config.hash_workers, 4);
        assert!(config.import.reimport_missing);
        assert_eq!(config.online.api_key.as_deref(), Some("secret"));
        assert_eq!(config.filename_template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::figment(None, Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.ini");
        std::fs::write(&path, "").unwrap();
        let err = Config::figment(None, Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.json");
        std::fs::write(&path, r#"{"hash_workers": "many"}"#).unwrap();
        let err = Config::from_figment(Config::figment(None, Some(&path)).unwrap()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Malformed(_)));
    }

    #[rstest]
    #[case::relative_root(Config { library_root: PathBuf::from("books"), ..base() }, "library_root")]
    #[case::no_workers(Config { hash_workers: 0, ..base() }, "hash_workers")]
    #[case::blank_template(Config { filename_template: "  ".into(), ..base() }, "filename_template")]
    fn test_validation(#[case] config: Config, #[case] expected: &str) {
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected));
    }

    #[test]
    fn test_relative_data_dir_is_inside_library() {
        let config = Config { data_dir: PathBuf::from(".shelf"), ..base() };
        assert_eq!(config.catalog_path(), PathBuf::from("/books/.shelf/catalog.json"));
        assert_eq!(base().lock_path(), PathBuf::from("/data/shelf.lock"));
    }
}
