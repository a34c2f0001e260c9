//! Class label set loaded from the labels file shipped with the model.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Box colors as RGB, cycled by class id.
const PALETTE: [[u8; 3]; 6] = [
    [0xe7, 0x4c, 0x3c],
    [0x34, 0x98, 0xdb],
    [0xe6, 0x7e, 0x22],
    [0x2e, 0xcc, 0x71],
    [0x9b, 0x59, 0xb6],
    [0xf1, 0xc4, 0x0f],
];

/// Ordered class names with the id of the first entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
    offset: u32,
}

impl LabelSet {
    /// Build a label set from names; `names[0]` has class id `offset`.
    pub fn new(names: Vec<String>, offset: u32) -> Self {
        Self { names, offset }
    }

    /// Read a labels file.
    ///
    /// # File Format
    /// - One class name per line
    /// - The first non-blank line is class id `offset`
    /// - Blank lines are ignored
    pub fn from_file(path: &Path, offset: u32) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::LabelsFileNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;

        let mut names = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                names.push(trimmed.to_string());
            }
        }

        if names.is_empty() {
            return Err(Error::EmptyLabels {
                path: path.to_path_buf(),
            });
        }

        Ok(Self::new(names, offset))
    }

    /// Name for a class id; unknown ids render as `class_<id>`.
    pub fn name(&self, class_id: u32) -> String {
        class_id
            .checked_sub(self.offset)
            .and_then(|i| self.names.get(i as usize))
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    /// Box color for a class id.
    pub fn color(&self, class_id: u32) -> [u8; 3] {
        let index = class_id.saturating_sub(self.offset) as usize;
        PALETTE[index % PALETTE.len()]
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the set has no classes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(class_id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        (self.offset..)
            .zip(self.names.iter())
            .map(|(id, name)| (id, name.as_str()))
    }
}

/// Hex string (`#rrggbb`) for an RGB color.
pub fn hex_color(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn road_labels() -> LabelSet {
        LabelSet::new(
            vec!["Crack".into(), "Manhole".into(), "Pothole".into()],
            1,
        )
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Crack").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  Manhole  ").unwrap();
        writeln!(file, "Pothole").unwrap();

        let labels = LabelSet::from_file(file.path(), 1).unwrap();
        assert_eq!(labels, road_labels());
    }

    #[test]
    fn test_empty_labels_file_is_error() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            LabelSet::from_file(file.path(), 1),
            Err(Error::EmptyLabels { .. })
        ));
    }

    #[test]
    fn test_missing_labels_file_is_error() {
        assert!(matches!(
            LabelSet::from_file(Path::new("nonexistent_labels.txt"), 1),
            Err(Error::LabelsFileNotFound { .. })
        ));
    }

    #[test]
    fn test_names_respect_offset() {
        let labels = road_labels();
        assert_eq!(labels.name(1), "Crack");
        assert_eq!(labels.name(3), "Pothole");
        assert_eq!(labels.name(0), "class_0");
        assert_eq!(labels.name(9), "class_9");
    }

    #[test]
    fn test_colors_match_dashboard_palette() {
        let labels = road_labels();
        assert_eq!(hex_color(labels.color(1)), "#e74c3c");
        assert_eq!(hex_color(labels.color(2)), "#3498db");
        assert_eq!(hex_color(labels.color(3)), "#e67e22");
    }

    #[test]
    fn test_iter_pairs_ids_with_names() {
        let labels = road_labels();
        let pairs: Vec<_> = labels.iter().collect();
        assert_eq!(pairs, vec![(1, "Crack"), (2, "Manhole"), (3, "Pothole")]);
    }
}
