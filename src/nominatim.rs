//! Nominatim geocoding client

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::NominatimConfig;
use crate::http;
use crate::{OpenglideError, Result};

/// A geocoded place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Anything that turns a place name into candidate coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Up to `limit` places matching `query`, best match first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>>;
}

/// Raw Nominatim search result; coordinates arrive as strings
#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimResult {
    fn into_place(self) -> Option<Place> {
        let latitude = self.lat.trim().parse().ok()?;
        let longitude = self.lon.trim().parse().ok()?;
        Some(Place {
            display_name: self.display_name,
            latitude,
            longitude,
        })
    }
}

pub struct NominatimClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl NominatimClient {
    pub fn new(config: &NominatimConfig) -> Result<Self> {
        let client = http::build_client(
            Duration::from_secs(config.timeout_seconds.into()),
            config.max_retries,
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, query: &str, limit: usize) -> String {
        format!(
            "{}/search?format=json&limit={}&q={}",
            self.base_url,
            limit,
            urlencoding::encode(query)
        )
    }
}

fn parse_results(body: &str) -> Result<Vec<Place>> {
    let results: Vec<NominatimResult> = serde_json::from_str(body)
        .map_err(|e| OpenglideError::api(format!("Failed to parse Nominatim response: {e}")))?;

    let total = results.len();
    let places: Vec<Place> = results
        .into_iter()
        .filter_map(NominatimResult::into_place)
        .collect();
    if places.len() < total {
        warn!("Skipped {} Nominatim results with unparsable coordinates", total - places.len());
    }
    Ok(places)
}

#[async_trait]
impl Geocoder for NominatimClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>> {
        let url = self.search_url(query, limit);
        debug!("Nominatim request URL: {}", url);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OpenglideError::api(format!("Nominatim request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenglideError::api(format!(
                "Nominatim returned error status: {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| OpenglideError::api(format!("Failed to read Nominatim response: {e}")))?;
        let places = parse_results(&body)?;

        info!(
            "Found {} places for '{}' in {:.3}s",
            places.len(),
            query,
            start.elapsed().as_secs_f64()
        );
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::serve_stub;
    use axum::http::StatusCode;

    fn client(base_url: String) -> NominatimClient {
        NominatimClient::new(&NominatimConfig {
            base_url,
            max_retries: 0,
            ..NominatimConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_request() {
        let (base_url, seen) = serve_stub(
            "/search",
            StatusCode::OK,
            r#"[{"lat":"45.8992","lon":"6.1294","display_name":"Annecy"}]"#,
        )
        .await;

        let places = client(base_url).search("Lac d'Annecy", 3).await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].display_name, "Annecy");
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["format=json&limit=3&q=Lac%20d%27Annecy"]
        );
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let (base_url, _) = serve_stub("/search", StatusCode::FORBIDDEN, "blocked").await;
        let result = client(base_url).search("Annecy", 3).await;
        match result {
            Err(OpenglideError::Api { message }) => assert!(message.contains("403"), "{message}"),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_nominatim_response() {
        let json = r#"[
            {"place_id": 1, "lat":"45.8992","lon":"6.1294","display_name":"Annecy, Haute-Savoie, France"},
            {"place_id": 2, "lat":"not a number","lon":"6.1","display_name":"Broken"},
            {"place_id": 3, "lat":"46.0","lon":"7.0"}
        ]"#;
        let places = parse_results(json).unwrap();

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].display_name, "Annecy, Haute-Savoie, France");
        assert_eq!(places[0].latitude, 45.8992);
        assert_eq!(places[0].longitude, 6.1294);
        assert_eq!(places[1].display_name, "");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let result = parse_results(r#"{"error":"Unable to geocode"}"#);
        assert!(matches!(result, Err(OpenglideError::Api { .. })));
    }

    #[test]
    fn test_search_url_encodes_query() {
        let client = NominatimClient::new(&NominatimConfig {
            base_url: "https://nominatim.example.org/".to_string(),
            ..NominatimConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.search_url("Col du Forclaz & Lac", 8),
            "https://nominatim.example.org/search?format=json&limit=8&q=Col%20du%20Forclaz%20%26%20Lac"
        );
    }
}
