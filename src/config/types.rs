//! Configuration type definitions.

use crate::constants::{
    DEFAULT_BIND, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RADIUS_KM, annotate, geocode, imagery,
    map, model,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection model.
    pub model: Option<ModelConfig>,

    /// Default settings.
    pub defaults: DefaultsConfig,

    /// Data locations.
    pub paths: PathsConfig,

    /// Imagery API settings.
    pub imagery: ImageryConfig,

    /// Geocoding settings.
    pub geocode: GeocodeConfig,

    /// Dashboard server settings.
    pub server: ServerConfig,

    /// Annotated image settings.
    pub annotate: AnnotateConfig,
}

/// Configuration for the detection model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX model file.
    pub path: PathBuf,

    /// Path to the labels file (one class name per line).
    pub labels: PathBuf,

    /// Class id of the first line in the labels file.
    #[serde(default = "default_label_offset")]
    pub label_offset: u32,

    /// Model input width in pixels.
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// Model input height in pixels.
    #[serde(default = "default_input_height")]
    pub input_height: u32,

    /// Input tensor layout.
    #[serde(default)]
    pub layout: TensorLayout,

    /// Box encoding in the model output.
    #[serde(default)]
    pub box_format: BoxFormat,
}

const fn default_label_offset() -> u32 {
    model::LABEL_OFFSET
}

const fn default_input_width() -> u32 {
    model::INPUT_WIDTH
}

const fn default_input_height() -> u32 {
    model::INPUT_HEIGHT
}

impl ModelConfig {
    /// Model config with default input settings for the given files.
    pub fn new(path: PathBuf, labels: PathBuf) -> Self {
        Self {
            path,
            labels,
            label_offset: model::LABEL_OFFSET,
            input_width: model::INPUT_WIDTH,
            input_height: model::INPUT_HEIGHT,
            layout: TensorLayout::default(),
            box_format: BoxFormat::default(),
        }
    }

    /// Display name of the model (file stem).
    pub fn name(&self) -> String {
        self.path.file_stem().map_or_else(
            || "model".to_string(),
            |s| s.to_string_lossy().into_owned(),
        )
    }
}

/// Input tensor memory layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, channels, height, width]`.
    #[default]
    Nchw,
    /// `[batch, height, width, channels]`.
    Nhwc,
}

/// Bounding box encoding emitted by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoxFormat {
    /// Center x, center y, width, height.
    #[default]
    Cxcywh,
    /// Corner form: x min, y min, x max, y max.
    Xyxy,
}

/// Default analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Confidence threshold.
    pub confidence_threshold: f32,

    /// Imagery download radius in kilometers.
    pub radius_km: f64,

    /// Output formats written after each run.
    pub formats: Vec<OutputFormat>,

    /// Initial map center as `[lat, lon]`.
    pub map_center: [f64; 2],

    /// Initial map zoom.
    pub map_zoom: u8,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            radius_km: DEFAULT_RADIUS_KM,
            formats: vec![OutputFormat::Json, OutputFormat::Geojson],
            map_center: [map::DEFAULT_CENTER.0, map::DEFAULT_CENTER.1],
            map_zoom: map::DEFAULT_ZOOM,
        }
    }
}

/// Data locations. Unset entries are derived from `data_dir`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root data directory (default: platform data dir).
    pub data_dir: Option<PathBuf>,
    /// Images to run inference on (download target).
    pub images_dir: Option<PathBuf>,
    /// Annotated images and reports.
    pub output_dir: Option<PathBuf>,
    /// Pre-loaded marker GeoJSON.
    pub markers: Option<PathBuf>,
    /// User-reported images.
    pub reports_dir: Option<PathBuf>,
}

/// Imagery API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageryConfig {
    /// Image search endpoint.
    pub api_url: String,
    /// Maximum images per fetch.
    pub max_images: usize,
    /// Download 2048 px thumbnails instead of 1024 px.
    pub high_res: bool,
    /// Pause between search pages in milliseconds.
    pub page_delay_ms: u64,
    /// Pause between image downloads in milliseconds.
    pub download_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            api_url: imagery::API_URL.to_string(),
            max_images: imagery::DEFAULT_MAX_IMAGES,
            high_res: false,
            page_delay_ms: imagery::DEFAULT_PAGE_DELAY_MS,
            download_delay_ms: imagery::DEFAULT_DOWNLOAD_DELAY_MS,
            timeout_secs: imagery::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Geocoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Search endpoint.
    pub url: String,
    /// User agent sent with requests.
    pub user_agent: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            url: geocode::URL.to_string(),
            user_agent: geocode::USER_AGENT.to_string(),
        }
    }
}

/// Dashboard server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Annotated image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// TrueType font for captions; captions are skipped if it cannot be loaded.
    pub font: Option<PathBuf>,
    /// Box outline width in pixels.
    pub line_width: u32,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            font: None,
            line_width: annotate::LINE_WIDTH,
        }
    }
}

/// Supported report output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Detection report (`report.json`). Always written.
    Json,
    /// GeoJSON markers (`detections.geojson`).
    Geojson,
    /// Flat CSV of detection records.
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Geojson => write!(f, "geojson"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "geojson" => Ok(Self::Geojson),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().ok(), Some(OutputFormat::Json));
        assert_eq!(
            "GeoJSON".parse::<OutputFormat>().ok(),
            Some(OutputFormat::Geojson)
        );
        assert_eq!("csv".parse::<OutputFormat>().ok(), Some(OutputFormat::Csv));
        assert!("parquet".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_defaults_config_default_values() {
        let defaults = DefaultsConfig::default();
        assert_eq!(defaults.confidence_threshold, 0.74);
        assert_eq!(defaults.radius_km, 1.0);
        assert!(defaults.formats.contains(&OutputFormat::Geojson));
    }

    #[test]
    fn test_model_config_defaults_from_toml() {
        let model: ModelConfig = toml::from_str(
            r#"
path = "/models/road.onnx"
labels = "/models/road.labels.txt"
"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(model.label_offset, 1);
        assert_eq!(model.input_width, 640);
        assert_eq!(model.layout, TensorLayout::Nchw);
        assert_eq!(model.box_format, BoxFormat::Cxcywh);
        assert_eq!(model.name(), "road");
    }
}
