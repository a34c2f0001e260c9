//! User report intake: geo-tagged photos submitted outside the imagery API.
//!
//! Reports live in their own directory with an append-only `metadata.json`,
//! separate from the download store that each fetch replaces.

use crate::constants::{IMAGE_EXTENSIONS, METADATA_FILE};
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::metadata::{CaptureSource, ImageMetadata, MetadataStore, USER_REPORT_PREFIX};
use crate::utils::fs::ensure_dir;
use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Days covered by [`ReportStats::recent`].
const RECENT_DAYS: i64 = 7;

/// A stored report.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedReport {
    /// Copied image.
    pub path: PathBuf,
    /// Record appended to the reports metadata.
    pub record: ImageMetadata,
}

/// Copy `image` into `reports_dir` and record its location.
pub fn submit_report(
    reports_dir: &Path,
    image: &Path,
    location: Coordinate,
) -> Result<SubmittedReport> {
    submit_report_at(reports_dir, image, location, Local::now())
}

/// [`submit_report`] with an explicit submission time.
pub fn submit_report_at(
    reports_dir: &Path,
    image: &Path,
    location: Coordinate,
    now: DateTime<Local>,
) -> Result<SubmittedReport> {
    let extension = image
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| Error::ConfigValidation {
            message: format!("'{}' is not a supported image file", image.display()),
        })?;
    image::image_dimensions(image).map_err(|e| Error::ImageDecode {
        path: image.to_path_buf(),
        source: e,
    })?;

    ensure_dir(reports_dir)?;
    let id = now.format("%Y%m%d_%H%M%S_%3f").to_string();
    let file_name = format!("{USER_REPORT_PREFIX}{id}.{extension}");
    let path = reports_dir.join(&file_name);
    std::fs::copy(image, &path)?;

    let record = ImageMetadata {
        id,
        latitude: location.lat,
        longitude: location.lon,
        source: CaptureSource::UserReport,
        captured_at: Some(now.to_rfc3339()),
        compass_angle: None,
        file_name: Some(file_name),
    };

    let metadata_path = reports_dir.join(METADATA_FILE);
    let mut store = MetadataStore::load_or_empty(&metadata_path)?;
    store.insert(record.clone());
    store.save(&metadata_path)?;

    info!(
        "Stored report {} at {}",
        path.display(),
        location.short_label()
    );
    Ok(SubmittedReport { path, record })
}

/// Report counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    /// All stored reports.
    pub total: usize,
    /// Reports per day over the last seven days, days without uploads omitted.
    pub recent: BTreeMap<NaiveDate, usize>,
}

impl ReportStats {
    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let mut out = format!("Total reports: {}\n", self.total);
        if self.recent.is_empty() {
            out.push_str("No reports in the last 7 days\n");
        } else {
            out.push_str("Last 7 days:\n");
            for (day, count) in self.recent.iter().rev() {
                out.push_str(&format!("  {day}  {count}\n"));
            }
        }
        out
    }
}

/// Count reports in `reports_dir` as of `today`.
pub fn report_stats(reports_dir: &Path, today: NaiveDate) -> Result<ReportStats> {
    let store = MetadataStore::load_or_empty(&reports_dir.join(METADATA_FILE))?;
    let since = today - TimeDelta::days(RECENT_DAYS - 1);

    let mut recent = BTreeMap::new();
    for record in store.iter() {
        if let Some(day) = report_day(record)
            && day >= since
            && day <= today
        {
            *recent.entry(day).or_insert(0) += 1;
        }
    }

    Ok(ReportStats {
        total: store.len(),
        recent,
    })
}

fn report_day(record: &ImageMetadata) -> Option<NaiveDate> {
    if let Some(at) = record.captured_at.as_deref()
        && let Ok(parsed) = DateTime::parse_from_rfc3339(at)
    {
        return Some(parsed.date_naive());
    }
    let prefix = record.id.get(..8)?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}
