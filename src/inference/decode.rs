//! Model output decoding into raw detections.

use crate::config::BoxFormat;
use crate::error::{Error, Result};
use crate::inference::detector::{BBox, RawDetection};

/// One model output copied out of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    /// Tensor dimensions.
    pub shape: Vec<i64>,
    /// Flat row-major values.
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// Tensor from shape and data.
    pub const fn new(shape: Vec<i64>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    fn last_dim(&self) -> Option<usize> {
        self.shape.last().and_then(|d| usize::try_from(*d).ok())
    }
}

/// Geometry needed to map model-space boxes back to the original image.
#[derive(Debug, Clone, Copy)]
pub struct DecodeGeometry {
    /// Box encoding.
    pub box_format: BoxFormat,
    /// Model input size `(width, height)`.
    pub input_size: (u32, u32),
    /// Original image size `(width, height)`.
    pub image_size: (u32, u32),
}

impl DecodeGeometry {
    #[allow(clippy::cast_precision_loss)]
    fn to_image_box(self, values: &[f32]) -> BBox {
        let model_box = match self.box_format {
            BoxFormat::Cxcywh => BBox::from_center(values[0], values[1], values[2], values[3]),
            BoxFormat::Xyxy => BBox::new(values[0], values[1], values[2], values[3]),
        };
        let (iw, ih) = (self.input_size.0 as f32, self.input_size.1 as f32);
        let (ow, oh) = (self.image_size.0 as f32, self.image_size.1 as f32);
        model_box.scaled(ow / iw, oh / ih).clamped(ow, oh)
    }
}

/// Decode model outputs.
///
/// Supported layouts:
/// - one output `[1, N, K]` with `K >= 6` as `(box[4], score, class, ...)`
/// - three outputs `boxes [1, N, 4]`, `labels [1, N]`, `scores [1, N]`
pub fn decode_outputs(
    outputs: &[OutputTensor],
    geometry: DecodeGeometry,
) -> Result<Vec<RawDetection>> {
    match outputs {
        [single] => decode_single(single, geometry),
        [boxes, labels, scores, ..] => decode_split(boxes, labels, scores, geometry),
        _ => Err(Error::UnsupportedModelOutput {
            reason: format!("expected 1 or 3 outputs, got {}", outputs.len()),
        }),
    }
}

fn decode_single(output: &OutputTensor, geometry: DecodeGeometry) -> Result<Vec<RawDetection>> {
    let width = output.last_dim().filter(|k| *k >= 6).ok_or_else(|| {
        Error::UnsupportedModelOutput {
            reason: format!(
                "single output must have at least 6 values per row, shape {:?}",
                output.shape
            ),
        }
    })?;

    Ok(output
        .data
        .chunks_exact(width)
        .filter_map(|row| detection(&row[..4], row[4], row[5], geometry))
        .collect())
}

fn decode_split(
    boxes: &OutputTensor,
    labels: &OutputTensor,
    scores: &OutputTensor,
    geometry: DecodeGeometry,
) -> Result<Vec<RawDetection>> {
    if boxes.last_dim() != Some(4) {
        return Err(Error::UnsupportedModelOutput {
            reason: format!("boxes output must end in 4, shape {:?}", boxes.shape),
        });
    }
    let count = boxes.data.len() / 4;
    if labels.data.len() != count || scores.data.len() != count {
        return Err(Error::UnsupportedModelOutput {
            reason: format!(
                "output lengths disagree: {count} boxes, {} labels, {} scores",
                labels.data.len(),
                scores.data.len()
            ),
        });
    }

    Ok(boxes
        .data
        .chunks_exact(4)
        .zip(labels.data.iter().zip(scores.data.iter()))
        .filter_map(|(b, (label, score))| detection(b, *score, *label, geometry))
        .collect())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn detection(
    values: &[f32],
    score: f32,
    class: f32,
    geometry: DecodeGeometry,
) -> Option<RawDetection> {
    if !score.is_finite() || !class.is_finite() || class < 0.0 {
        return None;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(RawDetection {
        bbox: geometry.to_image_box(values),
        class_id: class.round() as u32,
        score,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const GEOMETRY: DecodeGeometry = DecodeGeometry {
        box_format: BoxFormat::Cxcywh,
        input_size: (640, 640),
        image_size: (1280, 320),
    };

    #[test]
    fn test_single_output_rescales_center_boxes() {
        let output = OutputTensor::new(
            vec![1, 2, 6],
            vec![
                320.0, 320.0, 64.0, 64.0, 0.9, 1.0, //
                100.0, 100.0, 10.0, 10.0, 0.3, 3.0,
            ],
        );
        let detections = decode_outputs(&[output], GEOMETRY).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].score, 0.9);
        assert_eq!(detections[0].bbox, BBox::new(576.0, 144.0, 704.0, 176.0));
        assert_eq!(detections[1].class_id, 3);
    }

    #[test]
    fn test_split_outputs_with_corner_boxes() {
        let geometry = DecodeGeometry {
            box_format: BoxFormat::Xyxy,
            input_size: (100, 100),
            image_size: (100, 100),
        };
        let outputs = [
            OutputTensor::new(vec![1, 1, 4], vec![10.0, 20.0, 30.0, 140.0]),
            OutputTensor::new(vec![1, 1], vec![2.0]),
            OutputTensor::new(vec![1, 1], vec![0.8]),
        ];
        let detections = decode_outputs(&outputs, geometry).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BBox::new(10.0, 20.0, 30.0, 100.0));
        assert_eq!(detections[0].class_id, 2);
    }

    #[test]
    fn test_non_finite_rows_are_dropped() {
        let output = OutputTensor::new(
            vec![1, 2, 6],
            vec![
                1.0, 1.0, 1.0, 1.0, f32::NAN, 1.0, //
                1.0, 1.0, 1.0, 1.0, 0.5, -1.0,
            ],
        );
        assert!(decode_outputs(&[output], GEOMETRY).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_layouts() {
        let narrow = OutputTensor::new(vec![1, 1, 4], vec![0.0; 4]);
        assert!(matches!(
            decode_outputs(&[narrow], GEOMETRY),
            Err(Error::UnsupportedModelOutput { .. })
        ));
        assert!(decode_outputs(&[], GEOMETRY).is_err());

        let mismatched = [
            OutputTensor::new(vec![1, 2, 4], vec![0.0; 8]),
            OutputTensor::new(vec![1, 1], vec![1.0]),
            OutputTensor::new(vec![1, 2], vec![0.5, 0.5]),
        ];
        assert!(decode_outputs(&mismatched, GEOMETRY).is_err());
    }
}
