//! Mapillary Graph API client: image search and thumbnail download.

use crate::constants::imagery::{CONNECT_TIMEOUT_SECS, FIELDS, MAX_PAGE_SIZE};
use crate::error::{Error, FetchFailure, Result};
use crate::geo::{BoundingBox, Coordinate};
use crate::metadata::{CaptureSource, ImageMetadata, image_id_from_file_name};
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Longest response body excerpt carried in an API error.
const ERROR_EXCERPT_CHARS: usize = 200;

/// JSON scalar the API sends either as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// String form.
    Text(String),
    /// Numeric form.
    Number(serde_json::Number),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// GeoJSON point as returned in the `geometry` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointGeometry {
    /// `[lon, lat]`.
    pub coordinates: [f64; 2],
}

/// One image from a search page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageEntry {
    /// Image identifier.
    pub id: Scalar,
    /// 1024 px thumbnail URL.
    #[serde(default)]
    pub thumb_1024_url: Option<String>,
    /// 2048 px thumbnail URL.
    #[serde(default)]
    pub thumb_2048_url: Option<String>,
    /// Capture time (epoch milliseconds or ISO string).
    #[serde(default)]
    pub captured_at: Option<Scalar>,
    /// Camera heading in degrees.
    #[serde(default)]
    pub compass_angle: Option<f64>,
    /// Capture location.
    #[serde(default)]
    pub geometry: Option<PointGeometry>,
}

impl ImageEntry {
    /// Local file name: `<id>_<captured_at>.jpg`.
    ///
    /// `None` when the id is not a plain `[A-Za-z0-9-]` token. Characters of
    /// the capture time outside `[A-Za-z0-9_-]` (`:` included) become `-`.
    pub fn file_name(&self) -> Option<String> {
        let id = self.id.to_string();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        let captured: String = self
            .captured_at
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        Some(format!("{id}_{captured}.jpg"))
    }

    /// Thumbnail URL at the requested resolution.
    pub fn thumbnail_url(&self, high_res: bool) -> Option<&str> {
        if high_res {
            self.thumb_2048_url.as_deref()
        } else {
            self.thumb_1024_url.as_deref()
        }
    }

    /// Metadata record for the downloaded file, if the entry has a location.
    pub fn to_metadata(&self) -> Option<ImageMetadata> {
        let location = Coordinate::from_geojson(self.geometry.as_ref()?.coordinates);
        let file_name = self.file_name()?;
        Some(ImageMetadata {
            id: image_id_from_file_name(&file_name),
            latitude: location.lat,
            longitude: location.lon,
            source: CaptureSource::Mapillary,
            captured_at: self.captured_at.as_ref().map(ToString::to_string),
            compass_angle: self.compass_angle,
            file_name: Some(file_name),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<ImageEntry>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    cursors: Option<Cursors>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

impl SearchPage {
    fn next_cursor(&self) -> Option<&str> {
        self.paging
            .as_ref()?
            .cursors
            .as_ref()?
            .after
            .as_deref()
            .filter(|c| !c.is_empty())
    }
}

/// Client for the image search endpoint.
#[derive(Debug, Clone)]
pub struct MapillaryClient {
    client: Client,
    api_url: String,
    api_key: String,
    page_delay: Duration,
}

impl MapillaryClient {
    /// Build a client with connect and per-request timeouts.
    pub fn new(
        api_url: &str,
        api_key: &str,
        timeout: Duration,
        page_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            page_delay,
        })
    }

    /// Page through the search results inside `bbox`, up to `max_images`.
    pub async fn search(&self, bbox: &BoundingBox, max_images: usize) -> Result<Vec<ImageEntry>> {
        let bbox_query = bbox.to_query();
        info!("Searching imagery in bounding box {bbox_query}");

        let mut images: Vec<ImageEntry> = Vec::new();
        let mut cursor: Option<String> = None;

        while images.len() < max_images {
            let limit = MAX_PAGE_SIZE.min(max_images - images.len()).to_string();
            let mut params = vec![
                ("access_token", self.api_key.as_str()),
                ("fields", FIELDS),
                ("bbox", bbox_query.as_str()),
                ("limit", limit.as_str()),
            ];
            if let Some(after) = cursor.as_deref() {
                params.push(("after", after));
            }
            let url = url::Url::parse_with_params(&self.api_url, &params).map_err(|e| {
                Error::ConfigValidation {
                    message: format!("invalid imagery API url '{}': {e}", self.api_url),
                }
            })?;

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| network_failure(&self.api_url, e))?;
            let body = checked_body(response, &self.api_url).await?;
            let page: SearchPage =
                serde_json::from_slice(&body).map_err(|e| FetchFailure::InvalidResponse {
                    reason: e.to_string(),
                })?;

            if page.data.is_empty() {
                break;
            }
            let next = page.next_cursor().map(str::to_string);
            images.extend(page.data);
            debug!("Fetched {} image entries so far", images.len());

            match next {
                Some(after) => cursor = Some(after),
                None => break,
            }
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        images.truncate(max_images);
        info!("Total images found: {}", images.len());
        Ok(images)
    }

    /// Stream one file to `dest`, returning the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_failure(url, e))?;
        let response = checked_response(response).await?;

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_failure(url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn network_failure(url: &str, source: reqwest::Error) -> Error {
    let url = url.split('?').next().unwrap_or(url).to_string();
    FetchFailure::Network { url, source }.into()
}

/// Classify a non-success status.
async fn checked_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchFailure::Unauthorized {
            status: status.as_u16(),
        }
        .into());
    }
    let body = response.bytes().await.unwrap_or_default();
    let message: String = String::from_utf8_lossy(&body)
        .chars()
        .take(ERROR_EXCERPT_CHARS)
        .collect();
    Err(FetchFailure::Api {
        status: status.as_u16(),
        message,
    }
    .into())
}

async fn checked_body(response: Response, url: &str) -> Result<Vec<u8>> {
    let response = checked_response(response).await?;
    let body = response.bytes().await.map_err(|e| network_failure(url, e))?;
    Ok(body.to_vec())
}
