//! Fail-soft batch inference over a set of images.

use crate::config::{OutputFormat, validate_threshold};
use crate::error::{Error, Result};
use crate::inference::Detector;
use crate::metadata::{MetadataStore, image_id_for_path};
use crate::output::progress::{
    create_image_progress, finish_progress, inc_progress, set_progress_message,
};
use crate::output::{
    Annotator, CsvWriter, DetectionRecord, DetectionReport, GeoJsonWriter, ImageError,
    OutputWriter, RunInfo, write_all,
};
use crate::pipeline::{ImageBatch, RunOptions, annotated_path_for, output_path_for};
use crate::utils::fs::ensure_dir;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Files written after a run.
#[derive(Debug, Clone, Default)]
pub struct WrittenOutputs {
    /// Paths of report artifacts.
    pub files: Vec<PathBuf>,
    /// Image ids with detections but no metadata record.
    pub missing_metadata: Vec<String>,
}

/// Run the detector over every image in `batch`.
///
/// A failure on one image is recorded in the report's `errors` and the batch
/// continues. An empty batch or an invalid threshold is rejected before the
/// model is called.
pub fn run_batch(
    batch: &ImageBatch,
    detector: &mut dyn Detector,
    annotator: &Annotator,
    options: &RunOptions,
) -> Result<DetectionReport> {
    validate_threshold(options.threshold)?;
    if batch.is_empty() {
        return Err(Error::NoImages {
            path: batch.dir.clone(),
        });
    }
    ensure_dir(&options.output_dir)?;

    let start = Instant::now();
    info!(
        "Running detection on {} images (threshold {:.2})",
        batch.len(),
        options.threshold
    );

    let progress = create_image_progress(batch.len(), options.progress);
    let mut detections = Vec::new();
    let mut errors = Vec::new();

    for path in &batch.files {
        let file_name = file_name_of(path);
        set_progress_message(progress.as_ref(), &file_name);

        match process_image(path, detector, annotator, options) {
            Ok(records) => {
                debug!("{file_name}: {} detections", records.len());
                detections.extend(records);
            }
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                errors.push(ImageError {
                    image_id: image_id_for_path(path),
                    image: file_name,
                    reason: error_chain(&e),
                });
            }
        }
        inc_progress(progress.as_ref());
    }

    finish_progress(progress, "Detection complete");
    info!(
        "Processed {} images in {:.1}s: {} detections, {} failed",
        batch.len(),
        start.elapsed().as_secs_f64(),
        detections.len(),
        errors.len()
    );

    Ok(DetectionReport {
        run: RunInfo::now(options.threshold, batch.len(), detector.name()),
        detections,
        errors,
    })
}

/// Decode, detect, filter and annotate one image.
pub fn process_image(
    path: &Path,
    detector: &mut dyn Detector,
    annotator: &Annotator,
    options: &RunOptions,
) -> Result<Vec<DetectionRecord>> {
    let image = image::open(path).map_err(|e| Error::ImageDecode {
        path: path.to_path_buf(),
        source: e,
    })?;

    let image_id = image_id_for_path(path);
    let file_name = file_name_of(path);
    let records: Vec<DetectionRecord> = detector
        .detect(&image)?
        .into_iter()
        .filter(|d| d.score >= options.threshold)
        .map(|d| DetectionRecord {
            image_id: image_id.clone(),
            image: file_name.clone(),
            bbox: d.bbox,
            class_id: d.class_id,
            label: annotator.labels().name(d.class_id),
            confidence: d.score,
        })
        .collect();

    let drawn: Vec<&DetectionRecord> = records.iter().collect();
    annotator.write(
        &image,
        &drawn,
        &annotated_path_for(path, &options.output_dir),
    )?;

    Ok(records)
}

/// Write the report and the configured derived outputs.
///
/// `report.json` is always written; GeoJSON and CSV follow `formats`.
pub fn write_outputs(
    report: &DetectionReport,
    metadata: &MetadataStore,
    output_dir: &Path,
    formats: &[OutputFormat],
) -> Result<WrittenOutputs> {
    ensure_dir(output_dir)?;
    let mut written = WrittenOutputs::default();

    let report_path = output_path_for(output_dir, OutputFormat::Json);
    report.save(&report_path)?;
    written.files.push(report_path);

    if formats.contains(&OutputFormat::Geojson) {
        let path = output_path_for(output_dir, OutputFormat::Geojson);
        let mut writer = GeoJsonWriter::new(&path, metadata);
        write_all(&mut writer, &report.detections)?;
        written.missing_metadata = writer.missing_metadata().to_vec();
        if !written.missing_metadata.is_empty() {
            warn!(
                "{} images with detections have no metadata record and are not on the map",
                written.missing_metadata.len()
            );
        }
        written.files.push(path);
    }

    if formats.contains(&OutputFormat::Csv) {
        let path = output_path_for(output_dir, OutputFormat::Csv);
        let mut writer = CsvWriter::new(&path)?;
        write_all(&mut writer, &report.detections)?;
        written.files.push(path);
    }

    for path in &written.files {
        debug!("Wrote {}", path.display());
    }
    Ok(written)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

fn error_chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::{BBox, LabelSet, RawDetection};
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    struct FixedDetector {
        scores: Vec<(u32, f32)>,
        calls: usize,
    }

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            self.calls += 1;
            Ok(self
                .scores
                .iter()
                .map(|(class_id, score)| RawDetection {
                    bbox: BBox::new(2.0, 2.0, 12.0, 12.0),
                    class_id: *class_id,
                    score: *score,
                })
                .collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn annotator() -> Annotator {
        Annotator::boxes_only(
            LabelSet::new(vec!["Crack".into(), "Manhole".into(), "Pothole".into()], 1),
            1,
        )
    }

    fn options(dir: &Path, threshold: f32) -> RunOptions {
        RunOptions {
            output_dir: dir.join("out"),
            threshold,
            formats: vec![OutputFormat::Json, OutputFormat::Geojson],
            progress: false,
        }
    }

    fn write_png(path: &Path) {
        RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_threshold_scenario() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("pre");
        std::fs::create_dir(&images).unwrap();
        write_png(&images.join("100_a.png"));

        let mut detector = FixedDetector {
            scores: vec![(1, 0.9), (3, 0.5), (2, 0.8)],
            calls: 0,
        };
        let batch = ImageBatch::discover(&images).unwrap();
        let report = run_batch(&batch, &mut detector, &annotator(), &options(dir.path(), 0.74))
            .unwrap();

        let labels: Vec<_> = report.detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["Crack", "Manhole"]);
        assert_eq!(report.detections[0].image_id, "100");
        assert!(dir.path().join("out/100_a_detected.png").exists());
        assert_eq!(report.run.model, "fixed");
    }

    #[test]
    fn test_empty_batch_rejected_before_model_call() {
        let dir = TempDir::new().unwrap();
        let batch = ImageBatch {
            dir: dir.path().to_path_buf(),
            files: Vec::new(),
        };
        let mut detector = FixedDetector {
            scores: vec![],
            calls: 0,
        };

        let result = run_batch(&batch, &mut detector, &annotator(), &options(dir.path(), 0.5));
        assert!(matches!(result, Err(Error::NoImages { .. })));
        assert_eq!(detector.calls, 0);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        let batch = ImageBatch {
            dir: dir.path().to_path_buf(),
            files: vec![dir.path().join("a.png")],
        };
        let mut detector = FixedDetector {
            scores: vec![],
            calls: 0,
        };

        let result = run_batch(&batch, &mut detector, &annotator(), &options(dir.path(), 1.5));
        assert!(matches!(result, Err(Error::InvalidThreshold { .. })));
    }

    #[test]
    fn test_write_outputs_reports_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let mut report = DetectionReport::empty(RunInfo::now(0.5, 1, "fixed"));
        report.detections.push(DetectionRecord {
            image_id: "ghost".into(),
            image: "ghost.jpg".into(),
            bbox: BBox::new(0.0, 0.0, 4.0, 4.0),
            class_id: 1,
            label: "Crack".into(),
            confidence: 0.9,
        });

        let written = write_outputs(
            &report,
            &MetadataStore::new(),
            dir.path(),
            &[OutputFormat::Json, OutputFormat::Geojson, OutputFormat::Csv],
        )
        .unwrap();

        assert_eq!(written.files.len(), 3);
        assert_eq!(written.missing_metadata, vec!["ghost".to_string()]);
        assert_eq!(DetectionReport::load(&written.files[0]).unwrap(), report);
    }
}
