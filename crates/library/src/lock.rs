//! Advisory lock keeping a second process away from the same catalog.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Holds the library lock file for as long as it lives.
///
/// The file is created exclusively and contains the holder's PID. Dropping
/// the guard removes it, so every exit path that unwinds (including a Ctrl-C
/// handled by the runtime) releases the library.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Take the lock at `path`, failing with
    /// [`AlreadyLocked`](ErrorKind::AlreadyLocked) if the file exists.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Lock)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                exn::bail!(ErrorKind::AlreadyLocked(path));
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::Lock),
        };
        let guard = Self { path };
        writeln!(file, "{}", std::process::id()).or_raise(|| ErrorKind::Lock)?;
        tracing::debug!(path = %guard.path.display(), "Acquired library lock");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Released library lock"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Could not remove lock file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/shelf.lock");

        let guard = LockGuard::acquire(&path).unwrap();
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());

        let err = LockGuard::acquire(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyLocked(p) if *p == path));

        drop(guard);
        assert!(!path.exists());
        assert!(LockGuard::acquire(&path).is_ok());
    }
}
