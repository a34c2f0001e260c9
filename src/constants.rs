//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "roadwatch";

/// Default confidence threshold for detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.74;

/// Default imagery download radius in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 1.0;

/// Operation lock file name, created in the data directory.
pub const OPERATION_LOCK_FILE: &str = ".roadwatch.lock";

/// Age after which an operation lock is treated as left behind by a dead process.
pub const STALE_LOCK_SECS: u64 = 6 * 60 * 60;

/// Metadata file name inside an image directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Secrets file name inside the config directory.
pub const SECRETS_FILE: &str = "secrets.toml";

/// Environment variable holding the imagery API key.
pub const API_KEY_ENV: &str = "MAPILLARY_API_KEY";

/// Suffix appended to the stem of annotated images.
pub const ANNOTATED_SUFFIX: &str = "_detected";

/// Supported image file extensions (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// Fetch radius bounds in kilometers.
pub mod radius {
    /// Smallest allowed radius.
    pub const MIN_KM: f64 = 0.1;
    /// Largest allowed radius.
    pub const MAX_KM: f64 = 5.0;
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f32 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f32 = 1.0;
    /// Decimal places for rounded confidence statistics.
    pub const DECIMAL_PLACES: i32 = 4;
}

/// Output file names inside the output directory.
pub mod output_files {
    /// Detection report.
    pub const REPORT: &str = "report.json";
    /// GeoJSON markers derived from the last report.
    pub const GEOJSON: &str = "detections.geojson";
    /// Flat CSV export of detection records.
    pub const CSV: &str = "detections.csv";
    /// Rendered map page.
    pub const MAP: &str = "map.html";
}

/// Degrees-per-kilometer factors for bounding box construction.
pub mod geo {
    /// Kilometers per degree of latitude.
    pub const KM_PER_DEG_LAT: f64 = 110.574;
    /// Kilometers per degree of longitude at the equator.
    pub const KM_PER_DEG_LON: f64 = 111.320;
}

/// Imagery API defaults.
pub mod imagery {
    /// Mapillary Graph API image search endpoint.
    pub const API_URL: &str = "https://graph.mapillary.com/images";
    /// Fields requested for every image.
    pub const FIELDS: &str = "id,thumb_1024_url,thumb_2048_url,captured_at,compass_angle,geometry";
    /// Largest page the API serves.
    pub const MAX_PAGE_SIZE: usize = 1000;
    /// Default cap on images per fetch.
    pub const DEFAULT_MAX_IMAGES: usize = 2000;
    /// Default pause between search pages in milliseconds.
    pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;
    /// Default pause between image downloads in milliseconds.
    pub const DEFAULT_DOWNLOAD_DELAY_MS: u64 = 300;
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT_SECS: u64 = 15;
}

/// Geocoding defaults.
pub mod geocode {
    /// Nominatim search endpoint.
    pub const URL: &str = "https://nominatim.openstreetmap.org/search";
    /// User agent sent with geocoding requests.
    pub const USER_AGENT: &str = concat!("roadwatch/", env!("CARGO_PKG_VERSION"));
    /// Request timeout in seconds.
    pub const TIMEOUT_SECS: u64 = 10;
}

/// Map defaults.
pub mod map {
    /// Default map center (Paris).
    pub const DEFAULT_CENTER: (f64, f64) = (48.8566, 2.3522);
    /// Default zoom level.
    pub const DEFAULT_ZOOM: u8 = 12;
}

/// Model input defaults.
pub mod model {
    /// Default model input width in pixels.
    pub const INPUT_WIDTH: u32 = 640;
    /// Default model input height in pixels.
    pub const INPUT_HEIGHT: u32 = 640;
    /// Class id of the first line in the labels file.
    pub const LABEL_OFFSET: u32 = 1;
}

/// Annotation defaults.
pub mod annotate {
    /// Font tried when none is configured.
    pub const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";
    /// Box outline width in pixels.
    pub const LINE_WIDTH: u32 = 3;
    /// Caption font size in pixels.
    pub const FONT_SIZE: f32 = 16.0;
    /// Caption band height in pixels.
    pub const CAPTION_HEIGHT: u32 = 20;
}

/// Default dashboard bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";
