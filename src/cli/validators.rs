//! CLI argument validators.
//!
//! Range checks run at parse time so bad input never reaches a command.

use crate::constants::radius;

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))
}

/// Parse a value and check it lies in `[min, max]`.
pub fn parse_bounded_float(s: &str, min: f64, max: f64, name: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if !(min..=max).contains(&value) {
        return Err(format!("{name} must be between {min} and {max}, got {value}"));
    }
    Ok(value)
}

/// Parse a confidence threshold (0.0-1.0).
#[allow(clippy::cast_possible_truncation)]
pub fn parse_confidence(s: &str) -> Result<f32, String> {
    parse_bounded_float(s, 0.0, 1.0, "confidence").map(|v| v as f32)
}

/// Parse a latitude (-90.0 to 90.0).
pub fn parse_latitude(s: &str) -> Result<f64, String> {
    parse_bounded_float(s, -90.0, 90.0, "latitude")
}

/// Parse a longitude (-180.0 to 180.0).
pub fn parse_longitude(s: &str) -> Result<f64, String> {
    parse_bounded_float(s, -180.0, 180.0, "longitude")
}

/// Parse a fetch radius in kilometers.
pub fn parse_radius(s: &str) -> Result<f64, String> {
    parse_bounded_float(s, radius::MIN_KM, radius::MAX_KM, "radius")
}
