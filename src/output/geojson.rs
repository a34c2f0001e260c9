//! GeoJSON marker collections.
//!
//! The same schema serves two purposes: `detections.geojson` written after
//! each run, and the pre-loaded `points.geojson` marker file shipped with a
//! local dataset.

use crate::constants::confidence::DECIMAL_PLACES;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::metadata::MetadataStore;
use crate::output::{DetectionRecord, OutputWriter};
use crate::utils::fs::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// GeoJSON `FeatureCollection` of image markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    /// Always `FeatureCollection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// One feature per image.
    pub features: Vec<Feature>,
    /// Aggregate statistics over all features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CollectionSummary>,
}

/// Point feature for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Always `Feature`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Marker location.
    pub geometry: PointGeometry,
    /// Image and detection details.
    pub properties: MarkerProperties,
}

/// GeoJSON point geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    /// Always `Point`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lon, lat]`.
    pub coordinates: [f64; 2],
}

/// Properties of a marker feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerProperties {
    /// Source image file name.
    #[serde(default)]
    pub image: String,
    /// Image identifier.
    #[serde(default)]
    pub image_id: String,
    /// Per-class statistics ordered by class id.
    #[serde(default)]
    pub labels: Vec<LabelStats>,
}

/// Confidence statistics of one class within one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    /// Class id.
    pub label: u32,
    /// Class name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Mean confidence.
    #[serde(default)]
    pub avg_confidence: f64,
    /// Lowest confidence.
    #[serde(default)]
    pub min_confidence: f64,
    /// Highest confidence.
    #[serde(default)]
    pub max_confidence: f64,
    /// Number of detections.
    #[serde(default = "one")]
    pub count: usize,
}

const fn one() -> usize {
    1
}

/// Collection-level statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Number of features.
    pub total_images: usize,
    /// Sum of all label counts.
    pub total_detections: usize,
    /// Sorted distinct class names.
    pub unique_labels: Vec<String>,
    /// Confidence statistics.
    pub confidence_stats: ConfidenceStats,
}

/// Min, max and count-weighted mean confidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    /// Lowest confidence.
    pub min: f64,
    /// Highest confidence.
    pub max: f64,
    /// Mean confidence.
    pub avg: f64,
}

impl Feature {
    /// Marker location.
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::from_geojson(self.geometry.coordinates)
    }

    /// Whether any label of this feature is in `filter`.
    pub fn matches_labels(&self, filter: &[u32]) -> bool {
        self.properties
            .labels
            .iter()
            .any(|l| filter.contains(&l.label))
    }
}

impl FeatureCollection {
    /// Collection from features, computing the summary.
    pub fn new(features: Vec<Feature>) -> Self {
        let summary = summarize(&features);
        Self {
            kind: "FeatureCollection".to_string(),
            features,
            summary: Some(summary),
        }
    }

    /// Load a marker file.
    ///
    /// The embedded summary is derived data and is recomputed rather than
    /// trusted, so marker files written by other tools load as well.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::MarkersRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let parse_error = |e| Error::MarkersParse {
            path: path.to_path_buf(),
            source: e,
        };
        let mut document: serde_json::Value =
            serde_json::from_str(&content).map_err(parse_error)?;
        if let Some(object) = document.as_object_mut() {
            object.remove("summary");
        }
        let collection: Self = serde_json::from_value(document).map_err(parse_error)?;
        Ok(Self::new(collection.features))
    }

    /// Load a marker file, treating a missing file as an empty collection.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new(Vec::new()))
        }
    }

    /// Write the collection atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::JsonWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        write_atomic(path, &json)
    }

    /// Features whose labels intersect `filter`; `None` keeps everything.
    pub fn filtered(&self, filter: Option<&[u32]>) -> Vec<&Feature> {
        self.features
            .iter()
            .filter(|f| filter.is_none_or(|ids| f.matches_labels(ids)))
            .collect()
    }

    /// Distinct `(class_id, name)` pairs present in the collection.
    pub fn label_names(&self) -> BTreeMap<u32, String> {
        let mut names = BTreeMap::new();
        for label in self.features.iter().flat_map(|f| &f.properties.labels) {
            let entry = names.entry(label.label).or_insert_with(String::new);
            if entry.is_empty() {
                entry.clone_from(&label.name);
            }
        }
        names
    }
}

/// Result of turning detections into map markers.
#[derive(Debug, Clone)]
pub struct MarkerBuild {
    /// Features for images with known coordinates.
    pub collection: FeatureCollection,
    /// Image ids with detections but no metadata record.
    pub missing_metadata: Vec<String>,
}

/// Group detections by image into marker features.
///
/// Images without a metadata record are logged, counted and left off the map.
pub fn build_markers(detections: &[DetectionRecord], metadata: &MetadataStore) -> MarkerBuild {
    let mut order: Vec<&str> = Vec::new();
    let mut by_image: BTreeMap<&str, Vec<&DetectionRecord>> = BTreeMap::new();
    for record in detections {
        by_image
            .entry(record.image_id.as_str())
            .or_insert_with(|| {
                order.push(record.image_id.as_str());
                Vec::new()
            })
            .push(record);
    }

    let mut features = Vec::with_capacity(order.len());
    let mut missing_metadata = Vec::new();
    for image_id in order {
        let records = &by_image[image_id];
        let Some(entry) = metadata.get(image_id) else {
            warn!("No metadata record for image {image_id}; leaving it off the map");
            missing_metadata.push(image_id.to_string());
            continue;
        };
        features.push(Feature {
            kind: "Feature".to_string(),
            geometry: PointGeometry {
                kind: "Point".to_string(),
                coordinates: entry.coordinate().to_geojson(),
            },
            properties: MarkerProperties {
                image: records[0].image.clone(),
                image_id: image_id.to_string(),
                labels: label_stats(records),
            },
        });
    }

    MarkerBuild {
        collection: FeatureCollection::new(features),
        missing_metadata,
    }
}

fn label_stats(records: &[&DetectionRecord]) -> Vec<LabelStats> {
    let mut by_class: BTreeMap<u32, (String, Vec<f64>)> = BTreeMap::new();
    for record in records {
        by_class
            .entry(record.class_id)
            .or_insert_with(|| (record.label.clone(), Vec::new()))
            .1
            .push(f64::from(record.confidence));
    }

    by_class
        .into_iter()
        .map(|(label, (name, scores))| {
            #[allow(clippy::cast_precision_loss)]
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            LabelStats {
                label,
                name,
                avg_confidence: round_confidence(avg),
                min_confidence: round_confidence(scores.iter().copied().fold(f64::MAX, f64::min)),
                max_confidence: round_confidence(scores.iter().copied().fold(f64::MIN, f64::max)),
                count: scores.len(),
            }
        })
        .collect()
}

fn summarize(features: &[Feature]) -> CollectionSummary {
    let labels: Vec<&LabelStats> = features.iter().flat_map(|f| &f.properties.labels).collect();
    let total_detections: usize = labels.iter().map(|l| l.count).sum();

    let mut unique_labels: Vec<String> = labels
        .iter()
        .map(|l| {
            if l.name.is_empty() {
                format!("class_{}", l.label)
            } else {
                l.name.clone()
            }
        })
        .collect();
    unique_labels.sort();
    unique_labels.dedup();

    let confidence_stats = if total_detections == 0 {
        ConfidenceStats::default()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let weighted = labels
            .iter()
            .map(|l| l.avg_confidence * l.count as f64)
            .sum::<f64>()
            / total_detections as f64;
        ConfidenceStats {
            min: labels.iter().map(|l| l.min_confidence).fold(f64::MAX, f64::min),
            max: labels.iter().map(|l| l.max_confidence).fold(f64::MIN, f64::max),
            avg: round_confidence(weighted),
        }
    };

    CollectionSummary {
        total_images: features.len(),
        total_detections,
        unique_labels,
        confidence_stats,
    }
}

fn round_confidence(value: f64) -> f64 {
    let factor = 10_f64.powi(DECIMAL_PLACES);
    (value * factor).round() / factor
}

/// Streams detections and writes `detections.geojson` on finalize.
pub struct GeoJsonWriter<'a> {
    path: PathBuf,
    metadata: &'a MetadataStore,
    detections: Vec<DetectionRecord>,
    missing_metadata: Vec<String>,
}

impl<'a> GeoJsonWriter<'a> {
    /// Writer targeting `path`, resolving coordinates from `metadata`.
    pub fn new(path: &Path, metadata: &'a MetadataStore) -> Self {
        Self {
            path: path.to_path_buf(),
            metadata,
            detections: Vec::new(),
            missing_metadata: Vec::new(),
        }
    }

    /// Image ids left off the map after [`OutputWriter::finalize`].
    pub fn missing_metadata(&self) -> &[String] {
        &self.missing_metadata
    }
}

impl OutputWriter for GeoJsonWriter<'_> {
    fn write_header(&mut self) -> Result<()> {
        self.detections.clear();
        Ok(())
    }

    fn write_detection(&mut self, detection: &DetectionRecord) -> Result<()> {
        self.detections.push(detection.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let build = build_markers(&self.detections, self.metadata);
        build.collection.save(&self.path)?;
        self.missing_metadata = build.missing_metadata;
        Ok(())
    }
}
