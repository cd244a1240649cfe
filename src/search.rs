//! Search box behaviour: suggestions while typing and resolving a query
//! to the location the map jumps to.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cache::PersistentCache;
use crate::config::OpenglideConfig;
use crate::location::{Location, LocationInput, LocationParser};
use crate::nominatim::{Geocoder, Place};
use crate::{OpenglideError, Result};

/// One entry in the drop-down under the search box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Page that opens the map centered on this suggestion
    pub map_url: String,
}

impl Suggestion {
    fn new(label: String, latitude: f64, longitude: f64) -> Self {
        Self {
            label,
            latitude,
            longitude,
            map_url: format!("/map?lat={latitude}&lon={longitude}"),
        }
    }
}

pub struct SearchService {
    geocoder: Arc<dyn Geocoder>,
    cache: Option<Arc<PersistentCache>>,
    cache_ttl: Duration,
    max_suggestions: usize,
    search_zoom: u8,
}

impl SearchService {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        cache: Option<Arc<PersistentCache>>,
        config: &OpenglideConfig,
    ) -> Self {
        Self {
            geocoder,
            cache,
            cache_ttl: Duration::from_secs(u64::from(config.cache.geocode_ttl_hours) * 3600),
            max_suggestions: config.nominatim.max_suggestions as usize,
            search_zoom: config.map.search_zoom,
        }
    }

    /// Suggestions for the text typed so far
    #[instrument(skip(self))]
    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        match LocationParser::parse(query)? {
            LocationInput::Coordinates(lat, lon) => Ok(vec![Suggestion::new(
                format!("Go to coordinates: {lat}, {lon}"),
                lat,
                lon,
            )]),
            LocationInput::Name(name) => {
                let places = self.geocode(&name).await?;
                Ok(places
                    .into_iter()
                    .take(self.max_suggestions)
                    .map(|place| {
                        let label = if place.display_name.is_empty() {
                            format!("{},{}", place.latitude, place.longitude)
                        } else {
                            place.display_name
                        };
                        Suggestion::new(label, place.latitude, place.longitude)
                    })
                    .collect())
            }
        }
    }

    /// Where the map goes when the search is submitted
    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str) -> Result<Location> {
        match LocationParser::parse(query)? {
            LocationInput::Coordinates(lat, lon) => Ok(Location::new(
                lat,
                lon,
                format!("{lat:.4}, {lon:.4}"),
                self.search_zoom,
            )),
            LocationInput::Name(name) => {
                let place = self.geocode(&name).await?.into_iter().next().ok_or_else(|| {
                    OpenglideError::not_found(format!("No results found for \"{name}\"."))
                })?;
                debug!(
                    "Resolved '{}' to {} ({:.4}, {:.4})",
                    name, place.display_name, place.latitude, place.longitude
                );
                Ok(Location::new(
                    place.latitude,
                    place.longitude,
                    place.display_name,
                    self.search_zoom,
                ))
            }
        }
    }

    async fn geocode(&self, name: &str) -> Result<Vec<Place>> {
        let key = format!("geocode:{}", name.to_lowercase());

        if let Some(cache) = &self.cache {
            match cache.get::<Vec<Place>>(&key).await {
                Ok(Some(places)) => return Ok(places),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
            }
        }

        let places = self.geocoder.search(name, self.max_suggestions).await?;

        // empty answers are not cached, the place may be added to OSM later
        if let Some(cache) = self.cache.as_ref().filter(|_| !places.is_empty()) {
            if let Err(e) = cache.put_jittered(&key, places.clone(), self.cache_ttl).await {
                warn!("Failed to cache geocoding result: {}", e);
            }
        }

        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Geocoder answering from a fixed list, recording the queries it saw
    struct FakeGeocoder {
        places: Vec<Place>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    impl FakeGeocoder {
        fn new(places: Vec<Place>) -> Arc<Self> {
            Arc::new(Self {
                places,
                queries: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>> {
            self.queries.lock().unwrap().push((query.to_string(), limit));
            Ok(self.places.iter().take(limit).cloned().collect())
        }
    }

    fn place(name: &str, latitude: f64, longitude: f64) -> Place {
        Place {
            display_name: name.to_string(),
            latitude,
            longitude,
        }
    }

    fn many_places(n: usize) -> Vec<Place> {
        (0..n)
            .map(|i| place(&format!("Place {i}"), 45.0 + i as f64 * 0.1, 6.0))
            .collect()
    }

    #[tokio::test]
    async fn test_suggest_empty_query() {
        let geocoder = FakeGeocoder::new(many_places(3));
        let service = SearchService::new(geocoder.clone(), None, &OpenglideConfig::default());
        assert!(service.suggest("   ").await.unwrap().is_empty());
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_suggest_coordinates_skips_geocoder() {
        let geocoder = FakeGeocoder::new(many_places(3));
        let service = SearchService::new(geocoder.clone(), None, &OpenglideConfig::default());

        let suggestions = service.suggest("-12.5, 32.1").await.unwrap();
        assert_eq!(
            suggestions,
            vec![Suggestion {
                label: "Go to coordinates: -12.5, 32.1".to_string(),
                latitude: -12.5,
                longitude: 32.1,
                map_url: "/map?lat=-12.5&lon=32.1".to_string(),
            }]
        );
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_suggest_limits_to_eight() {
        let geocoder = FakeGeocoder::new(many_places(12));
        let service = SearchService::new(geocoder.clone(), None, &OpenglideConfig::default());

        let suggestions = service.suggest("Place").await.unwrap();
        assert_eq!(suggestions.len(), 8);
        assert_eq!(suggestions[0].label, "Place 0");
        assert_eq!(suggestions[0].map_url, "/map?lat=45&lon=6");
        assert_eq!(geocoder.queries.lock().unwrap()[0], ("Place".to_string(), 8));
    }

    #[tokio::test]
    async fn test_suggest_unnamed_place_uses_coordinates() {
        let geocoder = FakeGeocoder::new(vec![place("", 45.5, 6.25)]);
        let service = SearchService::new(geocoder, None, &OpenglideConfig::default());
        let suggestions = service.suggest("somewhere").await.unwrap();
        assert_eq!(suggestions[0].label, "45.5,6.25");
    }

    #[tokio::test]
    async fn test_resolve_uses_first_result() {
        let geocoder = FakeGeocoder::new(vec![
            place("Annecy, France", 45.8992, 6.1294),
            place("Annecy-le-Vieux, France", 45.92, 6.14),
        ]);
        let service = SearchService::new(geocoder, None, &OpenglideConfig::default());

        let location = service.resolve("Annecy").await.unwrap();
        assert_eq!(location.name, "Annecy, France");
        assert_eq!(location.latitude, 45.8992);
        assert_eq!(location.zoom, 12);
    }

    #[tokio::test]
    async fn test_resolve_coordinates() {
        let geocoder = FakeGeocoder::new(Vec::new());
        let service = SearchService::new(geocoder.clone(), None, &OpenglideConfig::default());

        let location = service.resolve("46.5, 7.25").await.unwrap();
        assert_eq!(location.latitude, 46.5);
        assert_eq!(location.longitude, 7.25);
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let geocoder = FakeGeocoder::new(Vec::new());
        let service = SearchService::new(geocoder, None, &OpenglideConfig::default());

        let err = service.resolve("Atlantis").await.unwrap_err();
        assert!(matches!(err, OpenglideError::NotFound { .. }));
        assert_eq!(err.to_string(), "No results found for \"Atlantis\".");
    }

    #[tokio::test]
    async fn test_resolve_empty_query() {
        let geocoder = FakeGeocoder::new(Vec::new());
        let service = SearchService::new(geocoder, None, &OpenglideConfig::default());
        assert!(matches!(
            service.resolve("").await,
            Err(OpenglideError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_geocoding_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PersistentCache::open(dir.path()).unwrap());
        let geocoder = FakeGeocoder::new(vec![place("Interlaken, Switzerland", 46.68, 7.86)]);
        let service =
            SearchService::new(geocoder.clone(), Some(cache), &OpenglideConfig::default());

        service.resolve("Interlaken").await.unwrap();
        let again = service.suggest("interlaken").await.unwrap();

        assert_eq!(again[0].label, "Interlaken, Switzerland");
        assert_eq!(geocoder.calls(), 1);
    }
}
