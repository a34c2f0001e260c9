//! Registry of paths to remove if the process is interrupted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

/// Lock files and staging directories owned by running operations.
static ACTIVE_PATHS: LazyLock<Mutex<Vec<PathBuf>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// Register a path for removal on signal.
pub fn register_cleanup(path: &Path) {
    if let Ok(mut paths) = ACTIVE_PATHS.lock() {
        paths.push(path.to_path_buf());
    }
}

/// Unregister a path after normal cleanup.
pub fn unregister_cleanup(path: &Path) {
    if let Ok(mut paths) = ACTIVE_PATHS.lock() {
        paths.retain(|p| p != path);
    }
}

/// Remove every registered path. Called from the Ctrl+C handler.
pub fn cleanup_all() {
    if let Ok(mut paths) = ACTIVE_PATHS.lock() {
        remove_paths(paths.drain(..));
    }
}

fn remove_paths(paths: impl IntoIterator<Item = PathBuf>) {
    for path in paths {
        if path.is_dir() {
            let _ = fs::remove_dir_all(&path);
        } else {
            let _ = fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
fn is_registered(path: &Path) -> bool {
    ACTIVE_PATHS
        .lock()
        .map(|paths| paths.iter().any(|p| p == path))
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_remove_paths_handles_files_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".roadwatch.lock");
        let staging = temp_dir.path().join(".pre.staging");
        File::create(&lock_path).unwrap();
        fs::create_dir(&staging).unwrap();
        File::create(staging.join("a.jpg")).unwrap();

        remove_paths([lock_path.clone(), staging.clone()]);

        assert!(!lock_path.exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_register_and_unregister() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keep.txt");

        register_cleanup(&path);
        assert!(is_registered(&path));
        unregister_cleanup(&path);
        assert!(!is_registered(&path));
    }

    #[test]
    #[serial(cleanup)]
    fn test_cleanup_all_removes_registered_paths() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".roadwatch.lock");
        File::create(&lock_path).unwrap();

        register_cleanup(&lock_path);
        cleanup_all();

        assert!(!lock_path.exists());
        assert!(!is_registered(&lock_path));
    }
}
