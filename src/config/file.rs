//! Configuration file loading.

use crate::config::Config;
use crate::constants::{API_KEY_ENV, SECRETS_FILE};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Load configuration from a TOML file.
///
/// Returns default config if the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load configuration from the default platform-specific path.
///
/// Returns default config if no config file exists.
pub fn load_default_config() -> Result<Config> {
    super::config_file_path().map_or_else(|_| Ok(Config::default()), |path| load_config_file(&path))
}

/// Save configuration to a TOML file.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::ConfigWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| Error::ConfigSerialize { source: e })?;

    std::fs::write(path, contents).map_err(|e| Error::ConfigWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(rename = "MAPILLARY_API_KEY")]
    mapillary_api_key: Option<String>,
}

/// Read the imagery API key from a secrets TOML file.
///
/// A missing file yields `None`; a malformed one is a config error.
pub fn read_secret_api_key(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let secrets: Secrets = toml::from_str(&contents).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(secrets
        .mapillary_api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

/// Resolve the imagery API key: explicit value, then environment, then secrets file.
pub fn resolve_api_key(explicit: Option<&str>) -> Result<Option<String>> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(Some(key.to_string()));
    }

    if let Ok(key) = std::env::var(API_KEY_ENV)
        && !key.trim().is_empty()
    {
        return Ok(Some(key.trim().to_string()));
    }

    match super::config_dir() {
        Ok(dir) => read_secret_api_key(&dir.join(SECRETS_FILE)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_nonexistent_file_returns_default() {
        let path = Path::new("/nonexistent/path/config.toml");
        let config = load_config_file(path).unwrap();
        assert!(config.model.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[model]
path = "/path/to/road.onnx"
labels = "/path/to/labels.txt"
box_format = "xyxy"

[defaults]
confidence_threshold = 0.5
radius_km = 2.5

[imagery]
max_images = 100
"#
        )
        .unwrap();

        let config = load_config_file(file.path()).unwrap();
        let model = config.model.unwrap();
        assert_eq!(model.box_format, crate::config::BoxFormat::Xyxy);
        assert_eq!(config.defaults.confidence_threshold, 0.5);
        assert_eq!(config.defaults.radius_km, 2.5);
        assert_eq!(config.imagery.max_images, 100);
        assert_eq!(config.imagery.page_delay_ms, 500);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        assert!(matches!(
            load_config_file(file.path()),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_save_and_reload_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.defaults.radius_km = 0.5;

        save_config(&config, &path).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.defaults.radius_km, 0.5);
    }

    #[test]
    fn test_read_secret_api_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "MAPILLARY_API_KEY = \"  MLY|123  \"").unwrap();
        assert_eq!(
            read_secret_api_key(file.path()).unwrap().as_deref(),
            Some("MLY|123")
        );
    }

    #[test]
    fn test_read_secret_api_key_blank_is_none() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "MAPILLARY_API_KEY = \"\"").unwrap();
        assert!(read_secret_api_key(file.path()).unwrap().is_none());
        assert!(
            read_secret_api_key(Path::new("/nonexistent/secrets.toml"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_explicit_api_key_wins() {
        assert_eq!(
            resolve_api_key(Some("explicit")).unwrap().as_deref(),
            Some("explicit")
        );
    }
}
