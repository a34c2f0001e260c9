//! Imagery fetch: search, download, and replace the image directory.

use crate::config::ImageryConfig;
use crate::constants::METADATA_FILE;
use crate::error::{FetchFailure, Result};
use crate::geo::{BoundingBox, Coordinate};
use crate::imagery::{MapillaryClient, StagingDir};
use crate::metadata::MetadataStore;
use crate::output::progress::{
    create_download_progress, create_spinner, finish_progress, inc_progress,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Where to fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    /// Search center.
    pub center: Coordinate,
    /// Search radius in kilometers.
    pub radius_km: f64,
}

impl FetchRequest {
    /// Validated request. Coordinates and radius are checked here, before
    /// any network activity.
    pub fn new(lat: f64, lon: f64, radius_km: f64) -> Result<Self> {
        let center = Coordinate::new(lat, lon)?;
        BoundingBox::around(center, radius_km)?;
        Ok(Self { center, radius_km })
    }

    /// Search bounding box.
    pub fn bbox(&self) -> Result<BoundingBox> {
        BoundingBox::around(self.center, self.radius_km)
    }
}

/// Fetch tuning taken from configuration.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Image search endpoint.
    pub api_url: String,
    /// Maximum images per fetch.
    pub max_images: usize,
    /// Download 2048 px thumbnails.
    pub high_res: bool,
    /// Pause between search pages.
    pub page_delay: Duration,
    /// Pause between downloads.
    pub download_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether to show progress bars.
    pub progress: bool,
}

impl FetchSettings {
    /// Settings from the `[imagery]` config section.
    pub fn from_config(config: &ImageryConfig, progress: bool) -> Self {
        Self {
            api_url: config.api_url.clone(),
            max_images: config.max_images,
            high_res: config.high_res,
            page_delay: Duration::from_millis(config.page_delay_ms),
            download_delay: Duration::from_millis(config.download_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            progress,
        }
    }
}

/// Whether the area had any imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// At least one image was downloaded.
    Fetched,
    /// The search succeeded but found nothing.
    NoCoverage,
}

/// Outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Images now in the image directory.
    pub image_count: usize,
    /// Images found by the search.
    pub found: usize,
    /// Downloads that failed and were skipped.
    pub failed: usize,
    /// Coverage classification.
    pub coverage: Coverage,
    /// Replaced image directory.
    pub images_dir: PathBuf,
}

/// Download imagery around `request` and replace `images_dir` with it.
///
/// On success the directory holds exactly the downloaded images plus a fresh
/// `metadata.json`. On failure the directory is left as it was.
pub async fn fetch_imagery(
    request: &FetchRequest,
    api_key: Option<&str>,
    images_dir: &Path,
    settings: &FetchSettings,
) -> Result<FetchReport> {
    let bbox = request.bbox()?;
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(FetchFailure::MissingCredential)?;

    info!(
        "Fetching imagery within {} km of {}",
        request.radius_km,
        request.center.short_label()
    );

    let client = MapillaryClient::new(
        &settings.api_url,
        api_key,
        settings.timeout,
        settings.page_delay,
    )?;

    let spinner = create_spinner("Searching imagery...", settings.progress);
    let search = client.search(&bbox, settings.max_images).await;
    finish_progress(spinner, "Search complete");
    let entries = search?;

    let staging = StagingDir::acquire(images_dir)?;
    let mut metadata = MetadataStore::new();
    let mut failed = 0usize;

    let progress = create_download_progress(entries.len(), settings.progress);
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 && !settings.download_delay.is_zero() {
            tokio::time::sleep(settings.download_delay).await;
        }

        let Some(file_name) = entry.file_name() else {
            warn!("Skipping image with unusable id {:?}", entry.id.to_string());
            failed += 1;
            inc_progress(progress.as_ref());
            continue;
        };
        let Some(url) = entry.thumbnail_url(settings.high_res) else {
            warn!("No thumbnail URL for image {}", entry.id);
            failed += 1;
            inc_progress(progress.as_ref());
            continue;
        };
        let Some(record) = entry.to_metadata() else {
            warn!("No location for image {}, skipping", entry.id);
            failed += 1;
            inc_progress(progress.as_ref());
            continue;
        };

        let dest = staging.path().join(&file_name);
        match client.download(url, &dest).await {
            Ok(bytes) => {
                tracing::debug!("Downloaded {file_name} ({bytes} bytes)");
                metadata.insert(record);
            }
            Err(e) => {
                warn!("Download of image {} failed: {e}", entry.id);
                let _ = tokio::fs::remove_file(&dest).await;
                failed += 1;
            }
        }
        inc_progress(progress.as_ref());
    }
    finish_progress(progress, "Downloads complete");

    if !entries.is_empty() && metadata.is_empty() {
        return Err(FetchFailure::AllDownloadsFailed {
            attempted: entries.len(),
        }
        .into());
    }

    metadata.save(&staging.path().join(METADATA_FILE))?;
    staging.commit()?;

    let coverage = if metadata.is_empty() {
        Coverage::NoCoverage
    } else {
        Coverage::Fetched
    };
    info!(
        "Fetched {} images ({} found, {} failed) into {}",
        metadata.len(),
        entries.len(),
        failed,
        images_dir.display()
    );

    Ok(FetchReport {
        image_count: metadata.len(),
        found: entries.len(),
        failed,
        coverage,
        images_dir: images_dir.to_path_buf(),
    })
}
