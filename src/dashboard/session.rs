//! Dashboard session state.

use crate::config::{Config, validate_radius, validate_threshold};
use crate::error::Result;
use crate::geo::Coordinate;
use crate::summary::Summary;
use serde::{Deserialize, Serialize};

/// Which marker source and trigger the dashboard is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Local marker file; trigger runs inference on the pre-loaded images.
    #[default]
    Preloaded,
    /// Pick a location; trigger downloads imagery and runs inference on it.
    Fetch,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preloaded => write!(f, "preloaded"),
            Self::Fetch => write!(f, "fetch"),
        }
    }
}

/// User-controlled state, threaded through every handler.
///
/// Values are never mutated in place; each `with_*` returns an updated copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    mode: Mode,
    threshold: f32,
    radius_km: f64,
    label_filter: Option<Vec<u32>>,
    location: Option<Coordinate>,
    last_summary: Option<Summary>,
}

impl SessionContext {
    /// Fresh session seeded from config defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: Mode::default(),
            threshold: config.defaults.confidence_threshold,
            radius_km: config.defaults.radius_km,
            label_filter: None,
            location: None,
            last_summary: None,
        }
    }

    /// Active mode.
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Confidence threshold.
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Fetch radius in kilometers.
    pub const fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Class ids to show; `None` shows every marker.
    pub fn label_filter(&self) -> Option<&[u32]> {
        self.label_filter.as_deref()
    }

    /// Selected fetch location.
    pub const fn location(&self) -> Option<Coordinate> {
        self.location
    }

    /// Summary of the last completed run.
    pub const fn last_summary(&self) -> Option<&Summary> {
        self.last_summary.as_ref()
    }

    /// Switch mode.
    #[must_use]
    pub fn with_mode(self, mode: Mode) -> Self {
        Self { mode, ..self }
    }

    /// Update the threshold, rejecting values outside `[0, 1]`.
    pub fn with_threshold(self, threshold: f32) -> Result<Self> {
        validate_threshold(threshold)?;
        Ok(Self { threshold, ..self })
    }

    /// Update the radius, rejecting values outside the allowed range.
    pub fn with_radius(self, radius_km: f64) -> Result<Self> {
        validate_radius(radius_km)?;
        Ok(Self { radius_km, ..self })
    }

    /// Restrict markers to `ids`; an empty list clears the filter.
    #[must_use]
    pub fn with_label_filter(self, ids: Option<Vec<u32>>) -> Self {
        let label_filter = ids.filter(|ids| !ids.is_empty());
        Self {
            label_filter,
            ..self
        }
    }

    /// Select the fetch location.
    #[must_use]
    pub fn with_location(self, location: Coordinate) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }

    /// Record the summary of a completed run.
    #[must_use]
    pub fn with_summary(self, summary: Summary) -> Self {
        Self {
            last_summary: Some(summary),
            ..self
        }
    }
}
