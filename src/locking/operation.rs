//! Exclusive lock serializing fetch and inference runs over one data directory.

use crate::constants::{OPERATION_LOCK_FILE, STALE_LOCK_SECS};
use crate::error::{Error, Result};
use crate::locking::{register_cleanup, unregister_cleanup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Lock file content, for diagnosing a stuck lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that holds the lock.
    pub pid: u32,
    /// Operation being run (`fetch`, `infer`, ...).
    pub operation: String,
    /// When the lock was acquired.
    pub started: DateTime<Utc>,
}

/// RAII guard for the operation lock.
///
/// Only one guard per data directory can exist at a time, across threads
/// and processes. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct OperationLock {
    lock_path: PathBuf,
}

impl OperationLock {
    /// Acquire the lock in `data_dir`, failing if another operation holds it.
    ///
    /// A lock older than [`STALE_LOCK_SECS`] is removed and acquisition retried once.
    pub fn acquire(data_dir: &Path, operation: &str) -> Result<Self> {
        Self::acquire_with_max_age(data_dir, operation, Duration::from_secs(STALE_LOCK_SECS))
    }

    /// Acquire the lock, replacing an existing one older than `max_age`.
    pub fn acquire_with_max_age(
        data_dir: &Path,
        operation: &str,
        max_age: Duration,
    ) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|e| Error::LockCreate {
            path: data_dir.to_path_buf(),
            source: e,
        })?;

        match Self::create(data_dir, operation) {
            Err(Error::OperationInProgress { .. }) if Self::is_stale(data_dir, max_age) => {
                match Self::holder(data_dir) {
                    Some(info) => warn!(
                        "Removing stale {} lock held by pid {} since {}",
                        info.operation, info.pid, info.started
                    ),
                    None => warn!("Removing stale unreadable operation lock"),
                }
                Self::remove_stale(data_dir)?;
                Self::create(data_dir, operation)
            }
            other => other,
        }
    }

    fn create(data_dir: &Path, operation: &str) -> Result<Self> {
        let lock_path = Self::lock_path_for(data_dir);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);

        match file {
            Ok(mut f) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    operation: operation.to_string(),
                    started: Utc::now(),
                };
                let json = serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string());
                let _ = f.write_all(json.as_bytes());

                register_cleanup(&lock_path);
                debug!("Acquired operation lock for {operation}");
                Ok(Self { lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::OperationInProgress { path: lock_path })
            }
            Err(e) => Err(Error::LockCreate {
                path: lock_path,
                source: e,
            }),
        }
    }

    /// Lock file path inside a data directory.
    pub fn lock_path_for(data_dir: &Path) -> PathBuf {
        data_dir.join(OPERATION_LOCK_FILE)
    }

    /// Whether an operation currently holds the lock.
    pub fn is_held(data_dir: &Path) -> bool {
        Self::lock_path_for(data_dir).exists()
    }

    /// Details of the current holder, if readable.
    pub fn holder(data_dir: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(Self::lock_path_for(data_dir)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether the lock is older than `max_age`.
    ///
    /// Age comes from the recorded start time, or the file modification
    /// time when the content is unreadable. A missing lock is never stale.
    pub fn is_stale(data_dir: &Path, max_age: Duration) -> bool {
        if let Some(info) = Self::holder(data_dir) {
            return Utc::now()
                .signed_duration_since(info.started)
                .to_std()
                .is_ok_and(|age| age > max_age);
        }

        if let Ok(metadata) = fs::metadata(Self::lock_path_for(data_dir))
            && let Ok(modified) = metadata.modified()
        {
            return modified.elapsed().unwrap_or_default() > max_age;
        }
        false
    }

    /// Remove the lock file regardless of its holder.
    ///
    /// A lock that is already gone is not an error.
    pub fn remove_stale(data_dir: &Path) -> Result<()> {
        let lock_path = Self::lock_path_for(data_dir);
        match fs::remove_file(&lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::LockRemove {
                path: lock_path,
                source: e,
            }),
        }
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        unregister_cleanup(&self.lock_path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial(cleanup)]
    fn test_acquire_and_release_lock() {
        let temp_dir = TempDir::new().unwrap();

        let lock = OperationLock::acquire(temp_dir.path(), "infer").unwrap();
        assert!(OperationLock::is_held(temp_dir.path()));
        assert_eq!(
            OperationLock::holder(temp_dir.path()).unwrap().operation,
            "infer"
        );

        drop(lock);
        assert!(!OperationLock::is_held(temp_dir.path()));
    }

    #[test]
    #[serial(cleanup)]
    fn test_second_operation_is_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let _lock = OperationLock::acquire(temp_dir.path(), "fetch").unwrap();
        let second = OperationLock::acquire(temp_dir.path(), "infer");
        assert!(matches!(second, Err(Error::OperationInProgress { .. })));
    }

    fn write_lock(data_dir: &Path, started: &str) {
        fs::write(
            OperationLock::lock_path_for(data_dir),
            format!(r#"{{"pid": 999999, "operation": "fetch", "started": "{started}"}}"#),
        )
        .unwrap();
    }

    #[test]
    #[serial(cleanup)]
    fn test_stale_lock_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        write_lock(temp_dir.path(), "2020-01-01T00:00:00Z");
        assert!(OperationLock::is_stale(
            temp_dir.path(),
            Duration::from_secs(STALE_LOCK_SECS)
        ));

        let lock = OperationLock::acquire(temp_dir.path(), "infer").unwrap();
        let holder = OperationLock::holder(temp_dir.path()).unwrap();
        assert_eq!(holder.operation, "infer");
        assert_eq!(holder.pid, std::process::id());

        drop(lock);
        assert!(!OperationLock::is_held(temp_dir.path()));
    }

    #[test]
    #[serial(cleanup)]
    fn test_recent_foreign_lock_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        write_lock(temp_dir.path(), &Utc::now().to_rfc3339());

        let result = OperationLock::acquire(temp_dir.path(), "infer");
        assert!(matches!(result, Err(Error::OperationInProgress { .. })));
        assert_eq!(OperationLock::holder(temp_dir.path()).unwrap().pid, 999_999);
    }

    #[test]
    #[serial(cleanup)]
    fn test_unreadable_lock_falls_back_to_mtime() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(OperationLock::lock_path_for(temp_dir.path()), b"garbage").unwrap();

        assert!(!OperationLock::is_stale(temp_dir.path(), Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(50));
        assert!(OperationLock::is_stale(temp_dir.path(), Duration::from_millis(10)));

        let lock =
            OperationLock::acquire_with_max_age(temp_dir.path(), "fetch", Duration::from_millis(10));
        assert!(lock.is_ok());
    }

    #[test]
    fn test_remove_stale_on_missing_lock() {
        let temp_dir = TempDir::new().unwrap();
        OperationLock::remove_stale(temp_dir.path()).unwrap();
        assert!(!OperationLock::is_stale(temp_dir.path(), Duration::ZERO));
    }

    #[test]
    fn test_lock_path_format() {
        let path = OperationLock::lock_path_for(Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/.roadwatch.lock"));
    }
}
