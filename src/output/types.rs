//! Detection report types.

use crate::error::{Error, Result};
use crate::inference::BBox;
use crate::utils::fs::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A single detection that survived the confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Image identifier.
    pub image_id: String,
    /// Source image file name.
    pub image: String,
    /// Box in original image pixels.
    pub bbox: BBox,
    /// Class id emitted by the model.
    pub class_id: u32,
    /// Class name.
    pub label: String,
    /// Detection confidence (0.0 - 1.0).
    pub confidence: f32,
}

/// An image that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageError {
    /// Source image file name.
    pub image: String,
    /// Image identifier.
    pub image_id: String,
    /// Failure description.
    pub reason: String,
}

/// Metadata describing one inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Confidence threshold applied.
    pub threshold: f32,
    /// Number of images submitted.
    pub image_count: usize,
    /// Run completion time.
    pub timestamp: DateTime<Utc>,
    /// Model name.
    pub model: String,
    /// Version of this tool.
    pub version: String,
}

impl RunInfo {
    /// Run info stamped with the current time and crate version.
    pub fn now(threshold: f32, image_count: usize, model: impl Into<String>) -> Self {
        Self {
            threshold,
            image_count,
            timestamp: Utc::now(),
            model: model.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Structured output of one batch run. Each run replaces the previous report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Run metadata.
    pub run: RunInfo,
    /// Surviving detections in image order.
    pub detections: Vec<DetectionRecord>,
    /// Per-image failures.
    #[serde(default)]
    pub errors: Vec<ImageError>,
}

impl DetectionReport {
    /// Report with no detections or errors.
    pub const fn empty(run: RunInfo) -> Self {
        Self {
            run,
            detections: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Load a report file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ReportRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| Error::ReportParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the report, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::JsonWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        write_atomic(path, &json)
    }

    /// Number of images processed without error.
    pub fn processed_count(&self) -> usize {
        self.run.image_count.saturating_sub(self.errors.len())
    }

    /// Distinct image ids that have at least one detection.
    pub fn detected_image_ids(&self) -> BTreeSet<&str> {
        self.detections.iter().map(|d| d.image_id.as_str()).collect()
    }
}
