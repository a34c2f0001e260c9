//! HTTP dashboard: map page plus JSON endpoints for fetch, inference and lookups.

use crate::dashboard::controller::{Dashboard, RunOutcome};
use crate::dashboard::map::MapData;
use crate::dashboard::session::{Mode, SessionContext};
use crate::error::{Error, FetchFailure, Result};
use crate::geo::Coordinate;
use crate::geocode::{Geocoder, Place};
use crate::summary::Summary;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Shared server state.
pub struct AppState {
    dashboard: Arc<Dashboard>,
    geocoder: Geocoder,
    session: RwLock<SessionContext>,
}

impl AppState {
    /// State wrapping a controller and an initial session.
    pub fn new(dashboard: Dashboard, geocoder: Geocoder, session: SessionContext) -> Self {
        Self {
            dashboard: Arc::new(dashboard),
            geocoder,
            session: RwLock::new(session),
        }
    }
}

/// Error response carrying a status code and `{ "error", "code" }` body.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidLatitude { .. }
            | Error::InvalidLongitude { .. }
            | Error::InvalidRadius { .. }
            | Error::InvalidThreshold { .. }
            | Error::ConfigValidation { .. } => StatusCode::BAD_REQUEST,
            Error::OperationInProgress { .. } => StatusCode::CONFLICT,
            Error::LocationNotFound { .. }
            | Error::ReportRead { .. }
            | Error::MarkersRead { .. }
            | Error::NoImages { .. } => StatusCode::NOT_FOUND,
            Error::Fetch(FetchFailure::MissingCredential) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Fetch(_) | Error::Geocode { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `POST /api/fetch`.
#[derive(Debug, Deserialize)]
pub struct FetchBody {
    lat: f64,
    lon: f64,
    #[serde(default)]
    radius_km: Option<f64>,
    #[serde(default)]
    threshold: Option<f32>,
}

/// Body of `POST /api/infer`.
#[derive(Debug, Default, Deserialize)]
pub struct InferBody {
    #[serde(default)]
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    q: String,
}

#[derive(Debug, Deserialize)]
struct MarkersQuery {
    mode: Option<Mode>,
    labels: Option<String>,
}

/// Route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/fetch", post(fetch))
        .route("/api/infer", post(infer))
        .route("/api/summary", get(summary))
        .route("/api/geocode", get(geocode))
        .route("/api/markers", get(markers))
        .route("/api/session", get(session))
        .with_state(state)
}

/// Serve on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Dashboard listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Server {
            reason: e.to_string(),
        })
}

/// Bind `addr` and serve.
pub async fn run_server(addr: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| Error::Server {
        reason: format!("cannot bind {addr}: {e}"),
    })?;
    serve(listener, Arc::new(state)).await
}

async fn index(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    let session = state.session.read().await.clone();
    Ok(Html(state.dashboard.map_page(&session, true)?))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FetchBody>,
) -> ApiResult<Json<RunOutcome>> {
    let center = Coordinate::new(body.lat, body.lon)?;
    let mut session = state.session.read().await.clone().with_mode(Mode::Fetch);
    if let Some(radius) = body.radius_km {
        session = session.with_radius(radius)?;
    }
    if let Some(threshold) = body.threshold {
        session = session.with_threshold(threshold)?;
    }

    let (session, outcome) = Arc::clone(&state.dashboard)
        .download_and_process(session, center)
        .await?;
    *state.session.write().await = session;
    Ok(Json(outcome))
}

async fn infer(
    State(state): State<Arc<AppState>>,
    body: Option<Json<InferBody>>,
) -> ApiResult<Json<RunOutcome>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let mut session = state
        .session
        .read()
        .await
        .clone()
        .with_mode(Mode::Preloaded);
    if let Some(threshold) = body.threshold {
        session = session.with_threshold(threshold)?;
    }

    let dashboard = Arc::clone(&state.dashboard);
    let (session, outcome) = tokio::task::spawn_blocking(move || dashboard.run_preloaded(session))
        .await
        .map_err(|e| Error::Internal {
            message: format!("inference task failed: {e}"),
        })??;
    *state.session.write().await = session;
    Ok(Json(outcome))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<Summary>> {
    let threshold = match query.threshold {
        Some(t) => t,
        None => state.session.read().await.threshold(),
    };
    crate::config::validate_threshold(threshold)?;
    Ok(Json(state.dashboard.summary(threshold)?))
}

async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GeocodeQuery>,
) -> ApiResult<Json<Place>> {
    Ok(Json(state.geocoder.search(&query.q).await?))
}

async fn markers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarkersQuery>,
) -> ApiResult<Json<MapData>> {
    let mut session = state.session.read().await.clone();
    if let Some(mode) = query.mode {
        session = session.with_mode(mode);
    }
    if let Some(labels) = query.labels.as_deref() {
        session = session.with_label_filter(Some(parse_label_ids(labels)?));
    }
    let data = state.dashboard.map_data(&session)?;
    *state.session.write().await = session;
    Ok(Json(data))
}

async fn session(State(state): State<Arc<AppState>>) -> Json<SessionContext> {
    Json(state.session.read().await.clone())
}

/// Parse a comma-separated class id list.
fn parse_label_ids(text: &str) -> Result<Vec<u32>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| Error::ConfigValidation {
                message: format!("invalid label id '{s}'"),
            })
        })
        .collect()
}
