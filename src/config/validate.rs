//! Configuration and input validation.

use crate::config::{Config, ModelConfig};
use crate::constants::{confidence, radius};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_threshold(config.defaults.confidence_threshold)?;
    validate_radius(config.defaults.radius_km)?;
    validate_coordinate(config.defaults.map_center[0], config.defaults.map_center[1])?;

    if let Some(model) = &config.model {
        validate_model_shape(model)?;
    }

    if config.imagery.max_images == 0 {
        return Err(Error::ConfigValidation {
            message: "imagery.max_images must be at least 1".to_string(),
        });
    }

    if config.annotate.line_width == 0 {
        return Err(Error::ConfigValidation {
            message: "annotate.line_width must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn validate_model_shape(model: &ModelConfig) -> Result<()> {
    if model.input_width == 0 || model.input_height == 0 {
        return Err(Error::ConfigValidation {
            message: format!(
                "model input size must be positive, got {}x{}",
                model.input_width, model.input_height
            ),
        });
    }
    Ok(())
}

/// Validate a model configuration and check files exist.
pub fn validate_model_config(model: &ModelConfig) -> Result<()> {
    if !model.path.exists() {
        return Err(Error::ModelFileNotFound {
            path: model.path.clone(),
        });
    }

    if !model.labels.exists() {
        return Err(Error::LabelsFileNotFound {
            path: model.labels.clone(),
        });
    }

    validate_model_shape(model)
}

/// Validate a confidence threshold.
pub fn validate_threshold(value: f32) -> Result<()> {
    if (confidence::MIN..=confidence::MAX).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidThreshold { value })
    }
}

/// Validate a fetch radius in kilometers.
pub fn validate_radius(value: f64) -> Result<()> {
    if (radius::MIN_KM..=radius::MAX_KM).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidRadius {
            value,
            min: radius::MIN_KM,
            max: radius::MAX_KM,
        })
    }
}

/// Validate a latitude/longitude pair.
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(Error::InvalidLatitude { value: lat });
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::InvalidLongitude { value: lon });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_invalid_threshold() {
        let mut config = Config::default();
        config.defaults.confidence_threshold = 1.5;
        assert!(matches!(
            validate_config(&config),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_validate_radius_bounds() {
        assert!(validate_radius(0.1).is_ok());
        assert!(validate_radius(5.0).is_ok());
        assert!(validate_radius(0.05).is_err());
        assert!(matches!(
            validate_radius(10.0),
            Err(Error::InvalidRadius { .. })
        ));
        assert!(validate_radius(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_coordinate() {
        assert!(validate_coordinate(40.7128, -74.0060).is_ok());
        assert!(matches!(
            validate_coordinate(100.0, 0.0),
            Err(Error::InvalidLatitude { .. })
        ));
        assert!(matches!(
            validate_coordinate(0.0, 200.0),
            Err(Error::InvalidLongitude { .. })
        ));
    }

    #[test]
    fn test_validate_zero_input_size() {
        let mut config = Config::default();
        let mut model = ModelConfig::new(PathBuf::from("m.onnx"), PathBuf::from("l.txt"));
        model.input_width = 0;
        config.model = Some(model);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_missing_model_file() {
        let model = ModelConfig::new(
            PathBuf::from("/nonexistent/road.onnx"),
            PathBuf::from("/nonexistent/labels.txt"),
        );
        assert!(matches!(
            validate_model_config(&model),
            Err(Error::ModelFileNotFound { .. })
        ));
    }
}
