//! CLI argument definitions.

use crate::cli::validators::{parse_confidence, parse_latitude, parse_longitude, parse_radius};
use crate::config::{OutputFormat, TensorLayout};
use crate::dashboard::Mode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Road damage detection on street-level imagery.
#[derive(Debug, Parser)]
#[command(name = "roadwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (default: platform config dir).
    #[arg(long, global = true, env = "ROADWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding images, outputs and markers.
    #[arg(long, global = true, env = "ROADWATCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: full trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run detection on the pre-loaded images.
    Infer(InferArgs),
    /// Download imagery around a location and run detection on it.
    Fetch(FetchArgs),
    /// Summarize the last detection report.
    Summary(SummaryArgs),
    /// Write the map page.
    Map(MapArgs),
    /// Look up the coordinates of a place name.
    Geocode {
        /// Place name or address.
        query: String,
    },
    /// Submit a user photo report or show report statistics.
    Report(ReportArgs),
    /// Run the dashboard server.
    Serve(ServeArgs),
    /// Remove the operation lock left behind by an interrupted run.
    Unlock,
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Model overrides.
#[derive(Debug, Clone, Default, Args)]
pub struct ModelArgs {
    /// Path to ONNX model file (overrides config).
    #[arg(long, env = "ROADWATCH_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Path to labels file (overrides config).
    #[arg(long, env = "ROADWATCH_LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// Model input tensor layout.
    #[arg(long, value_enum)]
    pub layout: Option<TensorLayout>,
}

/// Arguments for `infer`.
#[derive(Debug, Args)]
pub struct InferArgs {
    /// Model overrides.
    #[command(flatten)]
    pub model: ModelArgs,

    /// Image directory (default: data dir `images/pre`).
    #[arg(short, long, env = "ROADWATCH_IMAGES_DIR")]
    pub images: Option<PathBuf>,

    /// Output directory for annotated images and reports.
    #[arg(short, long, env = "ROADWATCH_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "ROADWATCH_CONFIDENCE")]
    pub confidence: Option<f32>,

    /// Report formats (comma-separated: json,geojson,csv).
    #[arg(short, long, value_delimiter = ',', env = "ROADWATCH_FORMAT")]
    pub format: Option<Vec<OutputFormat>>,
}

/// Arguments for `fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Model overrides.
    #[command(flatten)]
    pub model: ModelArgs,

    /// Latitude of the search center (-90.0 to 90.0).
    #[arg(long, value_parser = parse_latitude, allow_hyphen_values = true,
          required_unless_present = "place", requires = "lon")]
    pub lat: Option<f64>,

    /// Longitude of the search center (-180.0 to 180.0).
    #[arg(long, value_parser = parse_longitude, allow_hyphen_values = true,
          required_unless_present = "place", requires = "lat")]
    pub lon: Option<f64>,

    /// Place name to geocode instead of --lat/--lon.
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub place: Option<String>,

    /// Search radius in kilometers (0.1-5.0).
    #[arg(short, long, value_parser = parse_radius, env = "ROADWATCH_RADIUS")]
    pub radius: Option<f64>,

    /// Imagery API key (default: MAPILLARY_API_KEY or secrets.toml).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Download 2048 px thumbnails.
    #[arg(long)]
    pub high_res: bool,

    /// Maximum images to download.
    #[arg(long)]
    pub max_images: Option<usize>,

    /// Download only; skip detection.
    #[arg(long)]
    pub download_only: bool,

    /// Confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "ROADWATCH_CONFIDENCE")]
    pub confidence: Option<f32>,
}

/// Arguments for `summary`.
#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Report file (default: `report.json` in the output directory).
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "ROADWATCH_CONFIDENCE")]
    pub confidence: Option<f32>,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `map`.
#[derive(Debug, Args)]
pub struct MapArgs {
    /// Marker source.
    #[arg(long, value_enum, default_value_t = Mode::Preloaded)]
    pub mode: Mode,

    /// Output HTML file (default: `map.html` in the output directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only show these class ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<u32>>,
}

/// Arguments for `report`.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Photo to submit.
    #[arg(long, required_unless_present = "stats", requires_all = ["lat", "lon"])]
    pub image: Option<PathBuf>,

    /// Latitude where the photo was taken.
    #[arg(long, value_parser = parse_latitude, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude where the photo was taken.
    #[arg(long, value_parser = parse_longitude, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Show report statistics instead of submitting.
    #[arg(long, conflicts_with = "image")]
    pub stats: bool,
}

/// Arguments for `serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Model overrides.
    #[command(flatten)]
    pub model: ModelArgs,

    /// Address to bind (default from config).
    #[arg(long, env = "ROADWATCH_BIND")]
    pub bind: Option<String>,

    /// Initial dashboard mode.
    #[arg(long, value_enum, default_value_t = Mode::Preloaded)]
    pub mode: Mode,

    /// Imagery API key (default: MAPILLARY_API_KEY or secrets.toml).
    #[arg(long)]
    pub api_key: Option<String>,
}
