//! Scoped staging directory that replaces its target only on commit.

use crate::error::{Error, Result};
use crate::locking::{register_cleanup, unregister_cleanup};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Working directory next to a target directory.
///
/// Populate [`StagingDir::path`], then [`StagingDir::commit`] to swap it in
/// place of the target. Dropping an uncommitted staging directory removes it
/// and leaves the target untouched.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagingDir {
    /// Create an empty staging directory for `target`.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = sibling(target, "staging");
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path).map_err(|e| Error::OutputDirCreateFailed {
            path: path.clone(),
            source: e,
        })?;
        register_cleanup(&path);
        debug!("Staging into {}", path.display());

        Ok(Self {
            path,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    /// Directory to populate.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that will be replaced.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Replace the target with the staged contents.
    ///
    /// The previous target is moved aside first and restored if the swap fails.
    pub fn commit(mut self) -> Result<()> {
        let previous = sibling(&self.target, "previous");
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        let had_target = self.target.exists();
        if had_target {
            fs::rename(&self.target, &previous)?;
        }

        if let Err(e) = fs::rename(&self.path, &self.target) {
            if had_target && let Err(restore) = fs::rename(&previous, &self.target) {
                warn!(
                    "Could not restore {} from {}: {restore}",
                    self.target.display(),
                    previous.display()
                );
            }
            return Err(Error::Io(e));
        }

        self.committed = true;
        unregister_cleanup(&self.path);
        if had_target && let Err(e) = fs::remove_dir_all(&previous) {
            warn!("Could not remove {}: {e}", previous.display());
        }
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_dir_all(&self.path);
            unregister_cleanup(&self.path);
        }
    }
}

fn sibling(target: &Path, tag: &str) -> PathBuf {
    let name = target.file_name().map_or_else(
        || std::borrow::Cow::Borrowed("images"),
        |n| n.to_string_lossy(),
    );
    target.with_file_name(format!(".{name}.{tag}-{}", std::process::id()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial(cleanup)]
    fn test_commit_replaces_target_wholesale() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pre");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("old.jpg"), b"old").unwrap();

        let staging = StagingDir::acquire(&target).unwrap();
        fs::write(staging.path().join("new.jpg"), b"new").unwrap();
        staging.commit().unwrap();

        assert!(target.join("new.jpg").exists());
        assert!(!target.join("old.jpg").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    #[serial(cleanup)]
    fn test_commit_creates_missing_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pre");

        let staging = StagingDir::acquire(&target).unwrap();
        fs::write(staging.path().join("a.jpg"), b"a").unwrap();
        staging.commit().unwrap();

        assert!(target.join("a.jpg").exists());
    }

    #[test]
    #[serial(cleanup)]
    fn test_drop_discards_and_keeps_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pre");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("old.jpg"), b"old").unwrap();

        let staging = StagingDir::acquire(&target).unwrap();
        let staging_path = staging.path().to_path_buf();
        fs::write(staging_path.join("new.jpg"), b"new").unwrap();
        drop(staging);

        assert!(!staging_path.exists());
        assert!(target.join("old.jpg").exists());
    }
}
