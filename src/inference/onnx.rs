//! ONNX Runtime backed detector.

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::inference::decode::{DecodeGeometry, OutputTensor, decode_outputs};
use crate::inference::detector::{Detector, RawDetection};
use crate::inference::preprocess::{
    InputGeometry, image_to_tensor, input_shape, resolve_input_geometry,
};
use image::DynamicImage;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

/// Detector running an ONNX model through `ort`.
pub struct OnnxDetector {
    session: Session,
    config: ModelConfig,
    name: String,
}

impl OnnxDetector {
    /// Load the model described by `config`.
    ///
    /// The ONNX Runtime shared library is located through `ORT_DYLIB_PATH`
    /// or the platform library search path.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        if !config.path.exists() {
            return Err(Error::ModelFileNotFound {
                path: config.path.clone(),
            });
        }

        let bytes = std::fs::read(&config.path)?;
        let load_error = |e: ort::Error| Error::ModelLoad {
            path: config.path.clone(),
            reason: e.to_string(),
        };
        let session = Session::builder()
            .map_err(load_error)?
            .commit_from_memory(&bytes)
            .map_err(load_error)?;

        let mut config = config.clone();
        let configured = InputGeometry {
            width: config.input_width,
            height: config.input_height,
            layout: config.layout,
        };
        let declared = session
            .inputs()
            .first()
            .and_then(|input| input.dtype().tensor_shape())
            .map(|shape| shape.to_vec());
        if let Some(dims) = declared {
            let geometry =
                resolve_input_geometry(&dims, configured).map_err(|reason| Error::ModelLoad {
                    path: config.path.clone(),
                    reason,
                })?;
            if geometry != configured {
                warn!(
                    "Model declares input {dims:?}; using {}x{} {:?} instead of configured {}x{} {:?}",
                    geometry.width,
                    geometry.height,
                    geometry.layout,
                    configured.width,
                    configured.height,
                    configured.layout
                );
            }
            config.input_width = geometry.width;
            config.input_height = geometry.height;
            config.layout = geometry.layout;
        }

        info!(
            "Loaded model {} ({}x{}, {:?}, {:?})",
            config.path.display(),
            config.input_width,
            config.input_height,
            config.layout,
            config.box_format
        );

        let name = config.name();
        Ok(Self {
            session,
            config,
            name,
        })
    }

    fn run_session(&mut self, data: Vec<f32>) -> Result<Vec<OutputTensor>> {
        let shape = input_shape(
            self.config.input_width,
            self.config.input_height,
            self.config.layout,
        );
        let tensor = Tensor::from_array((shape, data)).map_err(inference_error)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(inference_error)?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for index in 0..outputs.len() {
            let value = &outputs[index];
            let tensor = match value.try_extract_tensor::<f32>() {
                Ok((shape, data)) => OutputTensor::new(shape.to_vec(), data.to_vec()),
                Err(_) => {
                    let (shape, data) = value
                        .try_extract_tensor::<i64>()
                        .map_err(inference_error)?;
                    #[allow(clippy::cast_precision_loss)]
                    let data = data.iter().map(|v| *v as f32).collect();
                    OutputTensor::new(shape.to_vec(), data)
                }
            };
            tensors.push(tensor);
        }
        Ok(tensors)
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let data = image_to_tensor(
            image,
            self.config.input_width,
            self.config.input_height,
            self.config.layout,
        );
        let outputs = self.run_session(data)?;
        let geometry = DecodeGeometry {
            box_format: self.config.box_format,
            input_size: (self.config.input_width, self.config.input_height),
            image_size: (image.width(), image.height()),
        };
        let detections = decode_outputs(&outputs, geometry)?;
        debug!("Model emitted {} candidate boxes", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn inference_error(e: ort::Error) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}
