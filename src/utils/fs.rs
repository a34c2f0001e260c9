//! Filesystem helpers.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Write a file by writing a sibling temp file and renaming it into place.
///
/// Readers see either the previous contents or the new contents, never a
/// partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::OutputDirCreateFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = std::fs::write(&tmp, contents) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::Io(e)
    })
}

/// Temp path next to `path`, unique per process.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map_or_else(
        || std::borrow::Cow::Borrowed("output"),
        |n| n.to_string_lossy(),
    );
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Create a directory (and parents), mapping the error to the output-dir variant.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::OutputDirCreateFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
