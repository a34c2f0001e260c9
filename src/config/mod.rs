//! Configuration loading and management.

mod file;
mod paths;
mod types;
mod validate;

pub use file::{
    load_config_file, load_default_config, read_secret_api_key, resolve_api_key, save_config,
};
pub use paths::{DataPaths, config_dir, config_file_path, default_data_dir};
pub use types::{
    AnnotateConfig, BoxFormat, Config, DefaultsConfig, GeocodeConfig, ImageryConfig, ModelConfig,
    OutputFormat, PathsConfig, ServerConfig, TensorLayout,
};
pub use validate::{
    validate_config, validate_coordinate, validate_model_config, validate_radius,
    validate_threshold,
};
