//! Flat keyed metadata store backed by `metadata.json`.

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::utils::fs::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Why a metadata document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Valid JSON in a layout that holds no usable records.
    #[error("{0}")]
    Shape(String),
}

/// Where an image came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Downloaded from the imagery API.
    Mapillary,
    /// Part of a pre-supplied local dataset.
    #[default]
    Local,
    /// Submitted through the report intake.
    UserReport,
}

/// Geocoordinate and provenance of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image identifier (see [`super::image_id_from_file_name`]).
    pub id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Capture source.
    #[serde(default)]
    pub source: CaptureSource,
    /// Capture time as reported by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
    /// Camera heading in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compass_angle: Option<f64>,
    /// Image file name inside its directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ImageMetadata {
    /// Coordinate of the image.
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.latitude,
            lon: self.longitude,
        }
    }
}

/// Image id → metadata record map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    records: BTreeMap<String, ImageMetadata>,
}

impl MetadataStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding exactly `records`; later duplicates win.
    pub fn from_records(records: impl IntoIterator<Item = ImageMetadata>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Load a metadata file. A missing or malformed file is an error.
    ///
    /// Accepts the array format written by [`Self::save`], arrays of raw
    /// imagery API entries (`id`/`image_id` plus GeoJSON `geometry`), and
    /// objects keyed by image id.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::MetadataRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, CaptureSource::Local).map_err(|e| match e {
            DocumentError::Json(source) => Error::MetadataParse {
                path: path.to_path_buf(),
                source,
            },
            DocumentError::Shape(reason) => Error::MetadataInvalid {
                path: path.to_path_buf(),
                reason,
            },
        })
    }

    /// Load a metadata file, treating a missing file as an empty store.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Parse a metadata document. `default_source` applies to entries without one.
    ///
    /// Scalars, GeoJSON feature collections and non-empty documents without a
    /// single usable entry are rejected.
    pub fn parse(
        content: &str,
        default_source: CaptureSource,
    ) -> std::result::Result<Self, DocumentError> {
        let document: Value = serde_json::from_str(content)?;
        let entries: Vec<(Option<String>, Value)> = match document {
            Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
            Value::Object(map)
                if map.get("type").and_then(Value::as_str) == Some("FeatureCollection") =>
            {
                return Err(DocumentError::Shape(
                    "found a GeoJSON feature collection, expected image metadata".to_string(),
                ));
            }
            Value::Object(map) if map.contains_key("id") || map.contains_key("image_id") => {
                vec![(None, Value::Object(map))]
            }
            Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
            other => {
                return Err(DocumentError::Shape(format!(
                    "expected an array or object, found {}",
                    json_kind(&other)
                )));
            }
        };

        let total = entries.len();
        let records: Vec<ImageMetadata> = entries
            .into_iter()
            .filter_map(|(key, entry)| record_from_value(key, &entry, default_source))
            .collect();

        if total > 0 && records.is_empty() {
            return Err(DocumentError::Shape(format!(
                "none of the {total} entries has an id and coordinates"
            )));
        }
        if records.len() < total {
            warn!(
                "Skipped {} of {total} metadata entries without id or coordinates",
                total - records.len()
            );
        }

        Ok(Self::from_records(records))
    }

    /// Write the store as a JSON array sorted by id, replacing the file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let records: Vec<&ImageMetadata> = self.records.values().collect();
        let json = serde_json::to_vec_pretty(&records).map_err(|e| Error::JsonWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        write_atomic(path, &json)
    }

    /// Look up a record by image id.
    pub fn get(&self, id: &str) -> Option<&ImageMetadata> {
        self.records.get(id)
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: ImageMetadata) {
        self.records.insert(record.id.clone(), record);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageMetadata> {
        self.records.values()
    }

    /// Image ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

fn record_from_value(
    key: Option<String>,
    entry: &Value,
    default_source: CaptureSource,
) -> Option<ImageMetadata> {
    let id = entry
        .get("id")
        .or_else(|| entry.get("image_id"))
        .and_then(value_to_string)
        .or(key)?;

    let (latitude, longitude) = match (
        entry.get("latitude").and_then(Value::as_f64),
        entry.get("longitude").and_then(Value::as_f64),
    ) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            let coords = entry.get("geometry")?.get("coordinates")?.as_array()?;
            (coords.get(1)?.as_f64()?, coords.first()?.as_f64()?)
        }
    };

    let source = entry
        .get("source")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(default_source);

    Some(ImageMetadata {
        id,
        latitude,
        longitude,
        source,
        captured_at: entry.get("captured_at").and_then(value_to_string),
        compass_angle: entry.get("compass_angle").and_then(Value::as_f64),
        file_name: entry
            .get("file_name")
            .or_else(|| entry.get("image"))
            .and_then(value_to_string),
    })
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
