//! Versioned snapshots of the catalog in a git repository.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

/// What a [`backup`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A new commit was created.
    Committed,
    /// The archived catalog was already identical.
    Unchanged,
}

struct Git {
    exe: PathBuf,
    dir: PathBuf,
}
impl Git {
    fn discover(dir: &Path) -> Result<Self> {
        let exe = which::which("git").or_raise(|| ErrorKind::GitNotFound)?;
        Ok(Self { exe, dir: dir.to_path_buf() })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        tracing::trace!(?args, "Running git");
        let output = Command::new(&self.exe)
            .current_dir(&self.dir)
            .args(["-c", "user.name=shelf", "-c", "user.email=shelf@localhost", "-c", "commit.gpgsign=false"])
            .args(args)
            .output()
            .or_raise(|| ErrorKind::Io(self.exe.clone()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            exn::bail!(ErrorKind::Git(format!("git {}: {stderr}", args.join(" "))));
        }
        Ok(output)
    }
}

/// Copy the catalog file into `archive_dir`, a git repository (created if
/// needed), and commit it.
///
/// One invocation creates at most one commit; nothing is committed when the
/// archived copy is unchanged.
#[instrument(fields(catalog = %catalog.display(), archive = %archive_dir.display()))]
pub fn backup(catalog: &Path, archive_dir: &Path) -> Result<BackupOutcome> {
    std::fs::create_dir_all(archive_dir).or_raise(|| ErrorKind::Io(archive_dir.to_path_buf()))?;
    let git = Git::discover(archive_dir)?;
    if !archive_dir.join(".git").exists() {
        tracing::info!("Initialising backup repository");
        git.run(&["init", "--quiet"])?;
    }

    let name = catalog.file_name().ok_or_raise(|| ErrorKind::Io(catalog.to_path_buf()))?;
    std::fs::copy(catalog, archive_dir.join(name)).or_raise(|| ErrorKind::Io(catalog.to_path_buf()))?;
    let name = name.to_string_lossy();
    git.run(&["add", "--", &name])?;

    let status = git.run(&["status", "--porcelain", "--", &name])?;
    if status.stdout.iter().all(u8::is_ascii_whitespace) {
        tracing::info!("Catalog unchanged since last backup");
        return Ok(BackupOutcome::Unchanged);
    }
    let stamp = OffsetDateTime::now_utc().format(&Rfc3339).or_raise(|| ErrorKind::InvalidData("timestamp"))?;
    git.run(&["commit", "--quiet", "-m", &format!("Catalog backup {stamp}")])?;
    tracing::info!("Committed catalog backup");
    Ok(BackupOutcome::Committed)
}
