//! Platform-specific configuration and data paths.

use crate::config::Config;
use crate::constants::APP_NAME;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/roadwatch/`
/// - macOS: `~/Library/Application Support/roadwatch/`
/// - Windows: `%APPDATA%\roadwatch\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the default data directory for the current platform.
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Fully resolved data locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Root data directory; holds the operation lock.
    pub data_dir: PathBuf,
    /// Images that inference runs on; replaced by each download.
    pub images_dir: PathBuf,
    /// Annotated images and reports.
    pub output_dir: PathBuf,
    /// Pre-loaded marker GeoJSON.
    pub markers: PathBuf,
    /// User-reported images.
    pub reports_dir: PathBuf,
}

impl DataPaths {
    /// Derive every location from a root data directory.
    pub fn under(data_dir: &Path) -> Self {
        let images = data_dir.join("images");
        Self {
            data_dir: data_dir.to_path_buf(),
            images_dir: images.join("pre"),
            output_dir: images.join("output"),
            markers: data_dir.join("points.geojson"),
            reports_dir: images.join("pre_users"),
        }
    }

    /// Resolve locations from config, falling back to the platform data dir.
    pub fn resolve(config: &Config, data_dir_override: Option<&Path>) -> Result<Self> {
        let data_dir = match data_dir_override.or(config.paths.data_dir.as_deref()) {
            Some(dir) => dir.to_path_buf(),
            None => default_data_dir()?,
        };

        let base = Self::under(&data_dir);
        let paths = &config.paths;
        Ok(Self {
            images_dir: paths.images_dir.clone().unwrap_or(base.images_dir),
            output_dir: paths.output_dir.clone().unwrap_or(base.output_dir),
            markers: paths.markers.clone().unwrap_or(base.markers),
            reports_dir: paths.reports_dir.clone().unwrap_or(base.reports_dir),
            data_dir,
        })
    }
}
