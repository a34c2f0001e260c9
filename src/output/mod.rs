//! Run outputs: detection report, GeoJSON markers, CSV export and annotated images.

mod annotate;
mod csv;
mod geojson;
pub mod progress;
mod types;
mod writer;

pub use annotate::Annotator;
pub use csv::CsvWriter;
pub use geojson::{
    CollectionSummary, ConfidenceStats, Feature, FeatureCollection, GeoJsonWriter, LabelStats,
    MarkerBuild, MarkerProperties, PointGeometry, build_markers,
};
pub use types::{DetectionRecord, DetectionReport, ImageError, RunInfo};
pub use writer::{OutputWriter, write_all};
