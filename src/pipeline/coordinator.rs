//! Image discovery and output path layout.

use crate::config::OutputFormat;
use crate::constants::{ANNOTATED_SUFFIX, IMAGE_EXTENSIONS, output_files};
use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Options for one batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory for annotated images and reports.
    pub output_dir: PathBuf,
    /// Confidence threshold (`score >= threshold` survives).
    pub threshold: f32,
    /// Report formats to write.
    pub formats: Vec<OutputFormat>,
    /// Whether to show a progress bar.
    pub progress: bool,
}

/// Images to process, in file-name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBatch {
    /// Directory the images came from.
    pub dir: PathBuf,
    /// Image files.
    pub files: Vec<PathBuf>,
}

impl ImageBatch {
    /// Collect supported images directly inside `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            files: collect_image_files(dir)?,
        })
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether there are no images.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Collect image files directly inside `dir`, sorted by file name.
pub fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NoImages {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Check if a file has a supported image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(OsStr::new(known)))
    })
}

/// Path of the annotated copy of `input`: `<stem>_detected.<ext>`.
pub fn annotated_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input.file_stem().map_or_else(
        || std::borrow::Cow::Borrowed("image"),
        |s| s.to_string_lossy(),
    );
    let name = input.extension().map_or_else(
        || format!("{stem}{ANNOTATED_SUFFIX}"),
        |ext| format!("{stem}{ANNOTATED_SUFFIX}.{}", ext.to_string_lossy()),
    );
    output_dir.join(name)
}

/// Path of a report artifact inside the output directory.
pub fn output_path_for(output_dir: &Path, format: OutputFormat) -> PathBuf {
    let name = match format {
        OutputFormat::Json => output_files::REPORT,
        OutputFormat::Geojson => output_files::GEOJSON,
        OutputFormat::Csv => output_files::CSV,
    };
    output_dir.join(name)
}
