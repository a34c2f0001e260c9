//! Road damage detection: model loading, preprocessing and output decoding.

mod decode;
mod detector;
mod labels;
mod onnx;
mod preprocess;

pub use decode::{DecodeGeometry, OutputTensor, decode_outputs};
pub use detector::{BBox, Detector, RawDetection};
pub use labels::{LabelSet, hex_color};
pub use onnx::OnnxDetector;
pub use preprocess::{InputGeometry, image_to_tensor, input_shape, resolve_input_geometry};

use crate::config::{ModelConfig, validate_model_config};
use crate::error::Result;

/// Loaded model plus its label set.
pub struct LoadedModel {
    /// Detector session.
    pub detector: OnnxDetector,
    /// Class names.
    pub labels: LabelSet,
}

/// Validate the model configuration, then load labels and the model.
pub fn load_model(config: &ModelConfig) -> Result<LoadedModel> {
    validate_model_config(config)?;
    let labels = LabelSet::from_file(&config.labels, config.label_offset)?;
    let detector = OnnxDetector::from_config(config)?;
    Ok(LoadedModel { detector, labels })
}
