//! CSV output format writer.

use crate::constants::confidence::DECIMAL_PLACES;
use crate::error::{Error, Result};
use crate::output::{DetectionRecord, OutputWriter};
use crate::utils::fs::temp_sibling;
use std::fs::File;
use std::path::{Path, PathBuf};

const HEADER: [&str; 9] = [
    "image_id",
    "image",
    "class_id",
    "label",
    "confidence",
    "x_min",
    "y_min",
    "x_max",
    "y_max",
];

/// CSV format output writer, one row per detection.
///
/// Rows go to a temp sibling which replaces `path` on finalize.
pub struct CsvWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl CsvWriter {
    /// Create a new CSV writer.
    pub fn new(path: &Path) -> Result<Self> {
        let tmp_path = temp_sibling(path);
        let writer = csv::Writer::from_path(&tmp_path).map_err(|e| Error::CsvWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            tmp_path,
        })
    }

    fn csv_error(&self, source: csv::Error) -> Error {
        Error::CsvWrite {
            path: self.path.clone(),
            source,
        }
    }
}

impl OutputWriter for CsvWriter {
    fn write_header(&mut self) -> Result<()> {
        self.writer
            .write_record(HEADER)
            .map_err(|e| self.csv_error(e))
    }

    fn write_detection(&mut self, detection: &DetectionRecord) -> Result<()> {
        let bbox = detection.bbox;
        self.writer
            .write_record([
                detection.image_id.clone(),
                detection.image.clone(),
                detection.class_id.to_string(),
                detection.label.clone(),
                format!(
                    "{:.decimal$}",
                    detection.confidence,
                    decimal = DECIMAL_PLACES as usize
                ),
                format!("{:.1}", bbox.x_min),
                format!("{:.1}", bbox.y_min),
                format!("{:.1}", bbox.x_max),
                format!("{:.1}", bbox.y_max),
            ])
            .map_err(|e| self.csv_error(e))
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::BBox;
    use crate::output::write_all;
    use tempfile::TempDir;

    fn record(image_id: &str, label: &str) -> DetectionRecord {
        DetectionRecord {
            image_id: image_id.to_string(),
            image: format!("{image_id}_1.jpg"),
            bbox: BBox::new(1.0, 2.5, 30.0, 40.0),
            class_id: 2,
            label: label.to_string(),
            confidence: 0.93,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detections.csv");
        let mut writer = CsvWriter::new(&path).unwrap();
        write_all(&mut writer, &[record("a", "Manhole"), record("b", "Manhole")]).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "image_id,image,class_id,label,confidence,x_min,y_min,x_max,y_max"
        );
        assert_eq!(lines[1], "a,a_1.jpg,2,Manhole,0.9300,1.0,2.5,30.0,40.0");
    }

    #[test]
    fn test_labels_with_commas_are_quoted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detections.csv");
        let mut writer = CsvWriter::new(&path).unwrap();
        write_all(&mut writer, &[record("a", "Crack, alligator")]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"Crack, alligator\""));
    }

    #[test]
    fn test_unfinished_writer_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detections.csv");
        let mut writer = CsvWriter::new(&path).unwrap();
        writer.write_header().unwrap();
        drop(writer);

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
