//! JSON API consumed by the map page

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::OpenglideError;
use crate::cache::PersistentCache;
use crate::config::{MapConfig, OpenglideConfig};
use crate::geo::{BoundingBox, Coordinates, Viewport};
use crate::location::Location;
use crate::nominatim::NominatimClient;
use crate::overpass::OverpassClient;
use crate::search::{SearchService, Suggestion};
use crate::sites::{SiteCollection, SiteService};

#[derive(Clone)]
pub struct AppState {
    pub sites: Arc<SiteService>,
    pub search: Arc<SearchService>,
    pub map: MapConfig,
    /// Time an upstream lookup may take before the handler gives up
    pub upstream_timeout: Duration,
}

impl AppState {
    /// Wire the Overpass and Nominatim clients and the optional cache
    pub fn from_config(config: &OpenglideConfig) -> anyhow::Result<Self> {
        let cache = if config.cache.enabled {
            let cache = PersistentCache::open(&config.cache.location).with_context(|| {
                format!("Failed to open cache database at {}", config.cache.location)
            })?;
            Some(Arc::new(cache))
        } else {
            None
        };

        let overpass = OverpassClient::new(&config.overpass, &config.cache, cache.clone())?;
        let nominatim = NominatimClient::new(&config.nominatim)?;

        Ok(Self {
            sites: Arc::new(SiteService::new(Arc::new(overpass), &config.map)),
            search: Arc::new(SearchService::new(Arc::new(nominatim), cache, config)),
            map: config.map.clone(),
            upstream_timeout: Duration::from_secs(config.server.upstream_timeout_seconds.into()),
        })
    }
}

/// Run an upstream lookup within `budget`, reporting an overrun as an upstream failure
async fn within<T>(
    budget: Duration,
    lookup: impl Future<Output = crate::Result<T>>,
) -> crate::Result<T> {
    tokio::time::timeout(budget, lookup).await.map_err(|_| {
        OpenglideError::api(format!(
            "Upstream lookup did not finish within {}s",
            budget.as_secs()
        ))
    })?
}

/// Error body `{"error": "..."}` with a matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Keep the client message for input errors, replace it for upstream ones
    fn upstream(err: OpenglideError, message: &str) -> Self {
        if matches!(err, OpenglideError::Api { .. }) {
            error!("Upstream failure: {}", err);
            Self::new(StatusCode::BAD_GATEWAY, message)
        } else {
            err.into()
        }
    }
}

impl From<OpenglideError> for ApiError {
    fn from(err: OpenglideError) -> Self {
        let status = match &err {
            OpenglideError::Validation { .. } => StatusCode::BAD_REQUEST,
            OpenglideError::NotFound { .. } => StatusCode::NOT_FOUND,
            OpenglideError::Api { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SitesQuery {
    /// `south,west,north,east`
    pub bbox: String,
    pub zoom: Option<u8>,
    /// Viewport the browser currently shows data for
    pub since_bbox: Option<String>,
    pub since_zoom: Option<u8>,
    /// `lat,lon` to order the sites by distance from
    pub near: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ViewportQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

/// Initial view of the map page
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InitialView {
    pub center: Coordinates,
    pub zoom: u8,
    /// Whether a search marker belongs at `center`
    pub marker: bool,
    pub geometry_zoom: u8,
    pub refetch_threshold: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sites", get(get_sites))
        .route("/suggest", get(get_suggestions))
        .route("/search", get(get_search))
        .route("/viewport", get(get_viewport))
        .with_state(state)
}

async fn get_sites(
    State(state): State<AppState>,
    Query(query): Query<SitesQuery>,
) -> Result<Response, ApiError> {
    let zoom = query.zoom.unwrap_or(state.map.default_zoom);
    let current = Viewport::new(BoundingBox::parse_clamped(&query.bbox)?, zoom);

    let previous = match &query.since_bbox {
        Some(bbox) => Some(Viewport::new(
            BoundingBox::parse_clamped(bbox)?,
            query.since_zoom.unwrap_or(zoom),
        )),
        None => None,
    };
    let near = query.near.as_deref().map(Coordinates::parse).transpose()?;

    let collection: Option<SiteCollection> = within(
        state.upstream_timeout,
        state.sites.sites_for_viewport(&current, previous.as_ref()),
    )
    .await
    .map_err(|e| ApiError::upstream(e, "Failed to load data"))?;

    Ok(match collection {
        Some(mut collection) => {
            if let Some(near) = near {
                collection.sort_by_distance(&near);
            }
            Json(collection).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn get_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Suggestion>>, ApiError> {
    let suggestions = within(state.upstream_timeout, state.search.suggest(&query.q))
        .await
        .map_err(|e| ApiError::upstream(e, "Error fetching results"))?;
    Ok(Json(suggestions))
}

async fn get_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Location>, ApiError> {
    let location = within(state.upstream_timeout, state.search.resolve(&query.q)).await?;
    Ok(Json(location))
}

async fn get_viewport(
    State(state): State<AppState>,
    Query(query): Query<ViewportQuery>,
) -> Json<InitialView> {
    Json(initial_view(&state.map, query.lat.as_deref(), query.lon.as_deref()))
}

/// View for `/map?lat=..&lon=..`; anything unusable falls back to the default
#[must_use]
pub fn initial_view(map: &MapConfig, lat: Option<&str>, lon: Option<&str>) -> InitialView {
    let requested = lat
        .zip(lon)
        .and_then(|(lat, lon)| Some((lat.trim().parse::<f64>().ok()?, lon.trim().parse::<f64>().ok()?)))
        .and_then(|(lat, lon)| Coordinates::new(lat, lon).ok());

    if requested.is_none() && (lat.is_some() || lon.is_some()) {
        warn!("Ignoring unusable map position lat={:?} lon={:?}", lat, lon);
    }

    let (center, zoom, marker) = match requested {
        Some(center) => (center, map.search_zoom, true),
        None => (
            Coordinates {
                latitude: map.default_latitude,
                longitude: map.default_longitude,
            },
            map.default_zoom,
            false,
        ),
    };

    InitialView {
        center,
        zoom,
        marker,
        geometry_zoom: map.geometry_zoom,
        refetch_threshold: map.refetch_threshold,
    }
}
