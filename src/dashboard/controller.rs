//! Sequences dashboard actions into fetch, inference and summary calls.

use crate::config::{Config, DataPaths, OutputFormat};
use crate::constants::{METADATA_FILE, model};
use crate::dashboard::map::{MapData, MapOptions, map_data, render_map};
use crate::dashboard::session::{Mode, SessionContext};
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::imagery::{Coverage, FetchReport, FetchRequest, FetchSettings, fetch_imagery};
use crate::inference::{Detector, LabelSet, load_model};
use crate::locking::OperationLock;
use crate::metadata::MetadataStore;
use crate::output::{Annotator, DetectionReport, FeatureCollection, ImageError, RunInfo};
use crate::pipeline::{ImageBatch, RunOptions, output_path_for, run_batch, write_outputs};
use crate::summary::{Summary, summarize};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Detector plus the annotator that draws its results.
pub struct Engine {
    detector: Box<dyn Detector + Send>,
    annotator: Annotator,
}

impl Engine {
    /// Pair a detector with an annotator.
    pub fn new(detector: Box<dyn Detector + Send>, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    /// Load the configured model and labels.
    ///
    /// A missing model section or unreadable model/labels file is an error
    /// here, before any run starts.
    pub fn load(config: &Config) -> Result<Self> {
        let model = config.model.as_ref().ok_or(Error::ModelNotConfigured)?;
        let loaded = load_model(model)?;
        let annotator = Annotator::new(
            loaded.labels,
            config.annotate.font.as_deref(),
            config.annotate.line_width,
        );
        Ok(Self::new(Box::new(loaded.detector), annotator))
    }

    /// Class labels of the model.
    pub const fn labels(&self) -> &LabelSet {
        self.annotator.labels()
    }
}

/// Result of one triggered run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Mode the run was triggered from.
    pub mode: Mode,
    /// Summary at the session threshold.
    pub summary: Summary,
    /// Download result, for fetch runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchReport>,
    /// Images that failed to process.
    pub failed_images: Vec<ImageError>,
    /// Images with detections but no coordinates.
    pub missing_metadata: Vec<String>,
    /// Written report files.
    pub outputs: Vec<PathBuf>,
}

/// Dashboard controller over one data directory.
pub struct Dashboard {
    paths: DataPaths,
    formats: Vec<OutputFormat>,
    fetch: FetchSettings,
    api_key: Option<String>,
    map_center: Coordinate,
    map_zoom: u8,
    labels: LabelSet,
    engine: Mutex<Engine>,
    progress: bool,
}

impl Dashboard {
    /// Controller using `engine` for inference.
    pub fn new(
        config: &Config,
        paths: DataPaths,
        engine: Engine,
        api_key: Option<String>,
        progress: bool,
    ) -> Self {
        let mut formats = config.defaults.formats.clone();
        for required in [OutputFormat::Json, OutputFormat::Geojson] {
            if !formats.contains(&required) {
                formats.push(required);
            }
        }
        let [lat, lon] = config.defaults.map_center;

        Self {
            paths,
            formats,
            fetch: FetchSettings::from_config(&config.imagery, progress),
            api_key,
            map_center: Coordinate { lat, lon },
            map_zoom: config.defaults.map_zoom,
            labels: engine.labels().clone(),
            engine: Mutex::new(engine),
            progress,
        }
    }

    /// Resolved data locations.
    pub const fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Run inference on the pre-loaded images.
    pub fn run_preloaded(&self, session: SessionContext) -> Result<(SessionContext, RunOutcome)> {
        let _lock = OperationLock::acquire(&self.paths.data_dir, "infer")?;
        let outcome = self.infer(Mode::Preloaded, session.threshold(), None)?;
        let session = session.with_summary(outcome.summary.clone());
        Ok((session, outcome))
    }

    /// Download imagery around `center`, then run inference on it.
    ///
    /// An area without imagery skips inference and reports a zero summary.
    /// Inference runs on the blocking thread pool.
    pub async fn download_and_process(
        self: Arc<Self>,
        session: SessionContext,
        center: Coordinate,
    ) -> Result<(SessionContext, RunOutcome)> {
        let request = FetchRequest::new(center.lat, center.lon, session.radius_km())?;
        let session = session.with_location(center);
        let _lock = OperationLock::acquire(&self.paths.data_dir, "fetch")?;

        let fetched = fetch_imagery(
            &request,
            self.api_key.as_deref(),
            &self.paths.images_dir,
            &self.fetch,
        )
        .await?;

        let threshold = session.threshold();
        let outcome = if fetched.coverage == Coverage::NoCoverage {
            info!("No imagery in this area; skipping inference");
            self.clear_outputs(threshold, fetched)?
        } else {
            let this = Arc::clone(&self);
            tokio::task::spawn_blocking(move || this.infer(Mode::Fetch, threshold, Some(fetched)))
                .await
                .map_err(|e| Error::Internal {
                    message: format!("inference task failed: {e}"),
                })??
        };

        let session = session.with_summary(outcome.summary.clone());
        Ok((session, outcome))
    }

    /// Summary of the last report at `threshold`.
    pub fn summary(&self, threshold: f32) -> Result<Summary> {
        let report = DetectionReport::load(&output_path_for(
            &self.paths.output_dir,
            OutputFormat::Json,
        ))?;
        Ok(summarize(&report, threshold))
    }

    /// Markers for the session's mode, label filter applied.
    pub fn markers(&self, session: &SessionContext) -> Result<FeatureCollection> {
        load_markers(&self.paths, session.mode(), session.label_filter())
    }

    /// Marker payload for the page script.
    pub fn map_data(&self, session: &SessionContext) -> Result<MapData> {
        let markers = self.markers(session)?;
        Ok(map_data(&markers, &self.labels, &self.map_options(session, true)))
    }

    /// Full map page.
    pub fn map_page(&self, session: &SessionContext, interactive: bool) -> Result<String> {
        let markers = self.markers(session)?;
        Ok(render_map(
            &markers,
            &self.labels,
            &self.map_options(session, interactive),
        ))
    }

    fn map_options(&self, session: &SessionContext, interactive: bool) -> MapOptions {
        MapOptions {
            title: "Road Damage Detection".to_string(),
            center: session.location().unwrap_or(self.map_center),
            zoom: self.map_zoom,
            image_dir: Some(self.paths.output_dir.clone()),
            label_filter: session.label_filter().map(<[u32]>::to_vec),
            interactive,
        }
    }

    fn infer(&self, mode: Mode, threshold: f32, fetch: Option<FetchReport>) -> Result<RunOutcome> {
        let metadata = load_metadata(&self.paths.images_dir)?;
        let batch = ImageBatch::discover(&self.paths.images_dir)?;
        let options = RunOptions {
            output_dir: self.paths.output_dir.clone(),
            threshold,
            formats: self.formats.clone(),
            progress: self.progress,
        };

        let report = {
            let mut guard = self.engine.lock().map_err(|_| Error::Internal {
                message: "detector lock poisoned".to_string(),
            })?;
            let engine = &mut *guard;
            run_batch(&batch, engine.detector.as_mut(), &engine.annotator, &options)?
        };
        let written = write_outputs(&report, &metadata, &self.paths.output_dir, &self.formats)?;

        Ok(RunOutcome {
            mode,
            summary: summarize(&report, threshold),
            fetch,
            failed_images: report.errors,
            missing_metadata: written.missing_metadata,
            outputs: written.files,
        })
    }

    /// Replace the previous run's outputs with an empty report.
    fn clear_outputs(&self, threshold: f32, fetch: FetchReport) -> Result<RunOutcome> {
        let model_name = self
            .engine
            .lock()
            .map(|engine| engine.detector.name().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let report = DetectionReport::empty(RunInfo::now(threshold, 0, model_name));
        let written = write_outputs(
            &report,
            &MetadataStore::new(),
            &self.paths.output_dir,
            &self.formats,
        )?;

        Ok(RunOutcome {
            mode: Mode::Fetch,
            summary: summarize(&report, threshold),
            fetch: Some(fetch),
            failed_images: Vec::new(),
            missing_metadata: Vec::new(),
            outputs: written.files,
        })
    }
}

/// Markers for `mode`: the pre-loaded marker file, or the last run's GeoJSON.
///
/// A missing pre-loaded marker file is an error; a missing run output is an
/// empty map.
pub fn load_markers(
    paths: &DataPaths,
    mode: Mode,
    filter: Option<&[u32]>,
) -> Result<FeatureCollection> {
    let collection = match mode {
        Mode::Preloaded => FeatureCollection::load(&paths.markers)?,
        Mode::Fetch => FeatureCollection::load_or_empty(&output_path_for(
            &paths.output_dir,
            OutputFormat::Geojson,
        ))?,
    };
    let features = collection.filtered(filter).into_iter().cloned().collect();
    Ok(FeatureCollection::new(features))
}

/// Metadata for an image directory; a missing file leaves every image unmapped.
fn load_metadata(images_dir: &std::path::Path) -> Result<MetadataStore> {
    let path = images_dir.join(METADATA_FILE);
    if !path.exists() {
        warn!(
            "No {} in {}; detections will not appear on the map",
            METADATA_FILE,
            images_dir.display()
        );
    }
    MetadataStore::load_or_empty(&path)
}

/// Label set for rendering without a loaded model.
pub fn default_labels(config: &Config) -> LabelSet {
    config
        .model
        .as_ref()
        .and_then(|m| LabelSet::from_file(&m.labels, m.label_offset).ok())
        .unwrap_or_else(|| LabelSet::new(Vec::new(), model::LABEL_OFFSET))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use serial_test::serial;
    use crate::inference::{BBox, RawDetection};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedDetector;

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(vec![
                RawDetection {
                    bbox: BBox::new(1.0, 1.0, 8.0, 8.0),
                    class_id: 1,
                    score: 0.9,
                },
                RawDetection {
                    bbox: BBox::new(2.0, 2.0, 6.0, 6.0),
                    class_id: 3,
                    score: 0.5,
                },
            ])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct CountingDetector(Arc<AtomicUsize>);

    impl Detector for CountingDetector {
        fn detect(&mut self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            FixedDetector.detect(image)
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn dashboard(dir: &TempDir) -> Dashboard {
        let paths = DataPaths::under(dir.path());
        let labels = LabelSet::new(vec!["Crack".into(), "Manhole".into(), "Pothole".into()], 1);
        let engine = Engine::new(Box::new(FixedDetector), Annotator::boxes_only(labels, 1));
        Dashboard::new(&Config::default(), paths, engine, None, false)
    }

    fn seed_images(paths: &DataPaths) {
        std::fs::create_dir_all(&paths.images_dir).unwrap();
        for name in ["100_a.png", "200_b.png"] {
            RgbImage::from_pixel(10, 10, Rgb([40, 40, 40]))
                .save(paths.images_dir.join(name))
                .unwrap();
        }
        std::fs::write(
            paths.images_dir.join(METADATA_FILE),
            r#"[{"id": "100", "latitude": 48.85, "longitude": 2.35}]"#,
        )
        .unwrap();
    }

    #[test]
    #[serial(cleanup)]
    fn test_run_preloaded_updates_session_and_outputs() {
        let dir = TempDir::new().unwrap();
        let dashboard = dashboard(&dir);
        seed_images(dashboard.paths());

        let session = SessionContext::from_config(&Config::default());
        let (session, outcome) = dashboard.run_preloaded(session).unwrap();

        assert_eq!(outcome.summary.image_count, 2);
        assert_eq!(outcome.summary.detection_count, 2);
        assert_eq!(outcome.missing_metadata, vec!["200".to_string()]);
        assert_eq!(session.last_summary(), Some(&outcome.summary));
        assert!(!OperationLock::is_held(&dashboard.paths().data_dir));

        let lowered = dashboard.summary(0.5).unwrap();
        assert_eq!(lowered.detection_count, 2);
        let fetch_markers = dashboard
            .markers(&session.clone().with_mode(Mode::Fetch))
            .unwrap();
        assert_eq!(fetch_markers.features.len(), 1);
    }

    #[test]
    #[serial(cleanup)]
    fn test_run_rejected_while_locked() {
        let dir = TempDir::new().unwrap();
        let dashboard = dashboard(&dir);
        seed_images(dashboard.paths());

        let _held = OperationLock::acquire(&dashboard.paths().data_dir, "fetch").unwrap();
        let result = dashboard.run_preloaded(SessionContext::from_config(&Config::default()));
        assert!(matches!(result, Err(Error::OperationInProgress { .. })));
    }

    #[test]
    #[serial(cleanup)]
    fn test_malformed_metadata_blocks_run() {
        let dir = TempDir::new().unwrap();
        let dashboard = dashboard(&dir);
        seed_images(dashboard.paths());
        std::fs::write(dashboard.paths().images_dir.join(METADATA_FILE), "{not json").unwrap();

        let result = dashboard.run_preloaded(SessionContext::from_config(&Config::default()));
        assert!(matches!(result, Err(Error::MetadataParse { .. })));
        assert!(!dashboard.paths().output_dir.join("report.json").exists());
    }

    #[test]
    fn test_preloaded_markers_require_marker_file() {
        let dir = TempDir::new().unwrap();
        let dashboard = dashboard(&dir);
        let session = SessionContext::from_config(&Config::default());
        assert!(matches!(
            dashboard.markers(&session),
            Err(Error::MarkersRead { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_radius_before_credential_check() {
        let dir = TempDir::new().unwrap();
        let dashboard = Arc::new(dashboard(&dir));
        let session = SessionContext::from_config(&Config::default());
        let center = Coordinate::new(48.85, 2.35).unwrap();

        let wide = SessionContext::from_config(&{
            let mut config = Config::default();
            config.defaults.radius_km = 10.0;
            config
        });
        let result = Arc::clone(&dashboard).download_and_process(wide, center).await;
        assert!(matches!(result, Err(Error::InvalidRadius { .. })));

        let result = dashboard.download_and_process(session, center).await;
        assert!(matches!(
            result,
            Err(Error::Fetch(crate::error::FetchFailure::MissingCredential))
        ));
    }

    #[tokio::test]
    #[serial(cleanup)]
    async fn test_no_coverage_skips_inference_and_clears_outputs() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        let search = server
            .mock_async(|when, then| {
                when.method(GET).path("/images");
                then.status(200).json_body(serde_json::json!({"data": []}));
            })
            .await;

        let mut config = Config::default();
        config.imagery.api_url = server.url("/images");
        config.imagery.page_delay_ms = 0;
        config.imagery.download_delay_ms = 0;

        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let labels = LabelSet::new(vec!["Crack".into(), "Manhole".into(), "Pothole".into()], 1);
        let engine = Engine::new(
            Box::new(CountingDetector(Arc::clone(&calls))),
            Annotator::boxes_only(labels, 1),
        );
        let dashboard = Arc::new(Dashboard::new(
            &config,
            DataPaths::under(dir.path()),
            engine,
            Some("k".to_string()),
            false,
        ));
        seed_images(dashboard.paths());

        let session = SessionContext::from_config(&config);
        let (session, _) = dashboard.run_preloaded(session).unwrap();
        let fetch_session = session.with_mode(Mode::Fetch);
        assert_eq!(dashboard.markers(&fetch_session).unwrap().features.len(), 1);
        let before = calls.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        let center = Coordinate::new(0.0, -160.0).unwrap();
        let (session, outcome) = Arc::clone(&dashboard)
            .download_and_process(fetch_session, center)
            .await
            .unwrap();

        search.assert_async().await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
        assert_eq!(
            outcome.fetch.as_ref().map(|f| f.coverage),
            Some(Coverage::NoCoverage)
        );
        assert_eq!(outcome.summary.image_count, 0);
        assert_eq!(outcome.summary.detection_count, 0);
        assert_eq!(session.last_summary(), Some(&outcome.summary));

        assert_eq!(dashboard.summary(0.0).unwrap().detection_count, 0);
        assert!(dashboard.markers(&session).unwrap().features.is_empty());
        assert!(!OperationLock::is_held(&dashboard.paths().data_dir));
    }
}
