//! Error types for roadwatch.

use std::path::PathBuf;

/// Result type alias for roadwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for roadwatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// No model configured.
    #[error("no detection model configured (set [model] path in config or pass --model-path)")]
    ModelNotConfigured,

    /// Model file does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: PathBuf,
    },

    /// Labels file does not exist.
    #[error("labels file does not exist: {path}")]
    LabelsFileNotFound {
        /// Path to the missing labels file.
        path: PathBuf,
    },

    /// Labels file contains no labels.
    #[error("labels file '{path}' contains no labels")]
    EmptyLabels {
        /// Path to the labels file.
        path: PathBuf,
    },

    /// Failed to load the ONNX model.
    #[error("failed to load detection model '{path}': {reason}")]
    ModelLoad {
        /// Path to the model file.
        path: PathBuf,
        /// Description of the load failure.
        reason: String,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Model produced output in an unsupported layout.
    #[error("unsupported model output: {reason}")]
    UnsupportedModelOutput {
        /// Description of the layout problem.
        reason: String,
    },

    /// Failed to decode an image.
    #[error("failed to decode image '{path}'")]
    ImageDecode {
        /// Path to the image file.
        path: PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to write an annotated image.
    #[error("failed to write image '{path}'")]
    ImageWrite {
        /// Path to the image file.
        path: PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// Image directory contains no supported images.
    #[error("no images found in '{path}'")]
    NoImages {
        /// Directory that was searched.
        path: PathBuf,
    },

    /// Failed to read a metadata file.
    #[error("failed to read metadata file '{path}'")]
    MetadataRead {
        /// Path to the metadata file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a metadata file.
    #[error("failed to parse metadata file '{path}'")]
    MetadataParse {
        /// Path to the metadata file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Metadata file is valid JSON but holds no usable records.
    #[error("invalid metadata file '{path}': {reason}")]
    MetadataInvalid {
        /// Path to the metadata file.
        path: PathBuf,
        /// What is wrong with the document.
        reason: String,
    },

    /// Failed to read a detection report.
    #[error("failed to read detection report '{path}'")]
    ReportRead {
        /// Path to the report file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a detection report.
    #[error("failed to parse detection report '{path}'")]
    ReportParse {
        /// Path to the report file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to read a marker file.
    #[error("failed to read marker file '{path}'")]
    MarkersRead {
        /// Path to the marker file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a marker file.
    #[error("failed to parse marker file '{path}'")]
    MarkersParse {
        /// Path to the marker file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write a JSON output file.
    #[error("failed to write JSON output file '{path}'")]
    JsonWrite {
        /// Path to the JSON file.
        path: PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write a CSV output file.
    #[error("failed to write CSV output file '{path}'")]
    CsvWrite {
        /// Path to the CSV file.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Failed to create output directory.
    #[error("failed to create output directory '{path}'")]
    OutputDirCreateFailed {
        /// Path to the output directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid latitude value.
    #[error("invalid latitude: {value} (must be -90.0 to 90.0)")]
    InvalidLatitude {
        /// Invalid latitude value.
        value: f64,
    },

    /// Invalid longitude value.
    #[error("invalid longitude: {value} (must be -180.0 to 180.0)")]
    InvalidLongitude {
        /// Invalid longitude value.
        value: f64,
    },

    /// Fetch radius outside the allowed range.
    #[error("invalid radius: {value} km (must be {min} to {max})")]
    InvalidRadius {
        /// Requested radius in kilometers.
        value: f64,
        /// Minimum allowed radius.
        min: f64,
        /// Maximum allowed radius.
        max: f64,
    },

    /// Confidence threshold outside [0, 1].
    #[error("invalid confidence threshold: {value} (must be 0.0 to 1.0)")]
    InvalidThreshold {
        /// Invalid threshold value.
        value: f32,
    },

    /// Imagery fetch failed.
    #[error("imagery fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    /// Geocoding request failed.
    #[error("geocoding '{query}' failed: {reason}")]
    Geocode {
        /// Place name that was searched.
        query: String,
        /// Description of the failure.
        reason: String,
    },

    /// Place name could not be resolved.
    #[error("could not find location: {query}")]
    LocationNotFound {
        /// Place name that was searched.
        query: String,
    },

    /// Another fetch or inference operation holds the operation lock.
    #[error(
        "another download or inference is already running (lock: {path}); run 'roadwatch unlock' if it was interrupted"
    )]
    OperationInProgress {
        /// Path to the lock file.
        path: PathBuf,
    },

    /// Failed to create lock file.
    #[error("failed to create lock file '{path}'")]
    LockCreate {
        /// Path to the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove a stale lock file.
    #[error("failed to remove stale lock file '{path}'")]
    LockRemove {
        /// Path to the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Dashboard server failed.
    #[error("dashboard server error: {reason}")]
    Server {
        /// Description of the server failure.
        reason: String,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

/// Classified reason an imagery fetch failed.
///
/// Kept separate from [`Error`] so callers can tell an authentication problem
/// from a transport problem without string matching.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    /// No API credential was supplied.
    #[error("no imagery API key configured (use --api-key, MAPILLARY_API_KEY or secrets.toml)")]
    MissingCredential,

    /// The API rejected the credential.
    #[error("imagery API rejected the credential (HTTP {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level failure (DNS, connect, timeout, reset).
    #[error("network error contacting '{url}'")]
    Network {
        /// URL being requested (without credentials).
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("imagery API returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// The API response could not be parsed.
    #[error("invalid response from imagery API: {reason}")]
    InvalidResponse {
        /// Description of the parse failure.
        reason: String,
    },

    /// Every image download failed.
    #[error("all {attempted} image downloads failed")]
    AllDownloadsFailed {
        /// Number of downloads attempted.
        attempted: usize,
    },
}

impl FetchFailure {
    /// Short machine-readable code for the failure class.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Network { .. } => "network",
            Self::Api { .. } => "api_error",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::AllDownloadsFailed { .. } => "all_downloads_failed",
        }
    }
}

impl Error {
    /// Short machine-readable code, used by the dashboard API.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Fetch(failure) => failure.code(),
            Self::InvalidLatitude { .. }
            | Self::InvalidLongitude { .. }
            | Self::InvalidRadius { .. }
            | Self::InvalidThreshold { .. } => "invalid_input",
            Self::OperationInProgress { .. } => "operation_in_progress",
            Self::NoImages { .. } => "no_images",
            Self::LocationNotFound { .. } => "location_not_found",
            Self::Geocode { .. } => "geocode_failed",
            Self::ModelNotConfigured
            | Self::ModelFileNotFound { .. }
            | Self::LabelsFileNotFound { .. }
            | Self::EmptyLabels { .. }
            | Self::ModelLoad { .. }
            | Self::MetadataParse { .. }
            | Self::MetadataInvalid { .. }
            | Self::ConfigValidation { .. } => "configuration",
            _ => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_codes_are_distinct() {
        let codes = [
            FetchFailure::MissingCredential.code(),
            FetchFailure::Unauthorized { status: 401 }.code(),
            FetchFailure::Api {
                status: 500,
                message: String::new(),
            }
            .code(),
            FetchFailure::InvalidResponse {
                reason: String::new(),
            }
            .code(),
            FetchFailure::AllDownloadsFailed { attempted: 3 }.code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_fetch_error_wraps_failure_code() {
        let err = Error::from(FetchFailure::Unauthorized { status: 403 });
        assert_eq!(err.code(), "unauthorized");
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_invalid_radius_message() {
        let err = Error::InvalidRadius {
            value: 10.0,
            min: 0.1,
            max: 5.0,
        };
        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("10"));
    }
}
