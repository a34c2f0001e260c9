//! Place-name lookup through a Nominatim-compatible search endpoint.

use crate::config::GeocodeConfig;
use crate::constants::geocode::TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// A resolved place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    /// Location of the best match.
    pub location: Coordinate,
    /// Human-readable name reported by the service.
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: Degrees,
    lon: Degrees,
    #[serde(default)]
    display_name: String,
}

/// Nominatim sends coordinates as strings; accept numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Degrees {
    Text(String),
    Number(f64),
}

impl Degrees {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => Some(*n),
        }
    }
}

/// Geocoding client.
#[derive(Debug, Clone)]
pub struct Geocoder {
    client: Client,
    url: String,
}

impl Geocoder {
    /// Build a client sending the configured user agent.
    pub fn new(config: &GeocodeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Resolve `query` to its best match.
    pub async fn search(&self, query: &str) -> Result<Place> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::LocationNotFound {
                query: String::new(),
            });
        }

        let failed = |reason: String| Error::Geocode {
            query: query.to_string(),
            reason,
        };

        let url = url::Url::parse_with_params(
            &self.url,
            &[("q", query), ("format", "json"), ("limit", "1")],
        )
        .map_err(|e| failed(format!("invalid geocoding url '{}': {e}", self.url)))?;
        debug!("Geocoding '{query}'");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }
        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        let hits: Vec<SearchHit> =
            serde_json::from_slice(&body).map_err(|e| failed(format!("invalid response: {e}")))?;

        let hit = hits.into_iter().next().ok_or_else(|| Error::LocationNotFound {
            query: query.to_string(),
        })?;
        let (Some(lat), Some(lon)) = (hit.lat.value(), hit.lon.value()) else {
            return Err(failed("response has no usable coordinates".to_string()));
        };
        let location = Coordinate::new(lat, lon)?;

        info!("Found: {} ({})", hit.display_name, location.short_label());
        Ok(Place {
            location,
            display_name: hit.display_name,
        })
    }
}
