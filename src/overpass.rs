//! Overpass API client for free-flying features

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::cache::PersistentCache;
use crate::config::{CacheConfig, OverpassConfig};
use crate::geo::{BoundingBox, Coordinates};
use crate::http;
use crate::{OpenglideError, Result};

/// Tag filters for everything that looks like a flying site, a launch or a landing
const SITE_FILTERS: &[&str] = &[
    r#"["sport"="free_flying"]"#,
    r#"["free_flying:paragliding"="yes"]"#,
    r#"["free_flying:hanggliding"="yes"]"#,
    r#"["free_flying:site"="landing"]"#,
    r#"["free_flying:site"="launch"]"#,
    r#"["sport"="free_flying"]["aeroway"="aerodrome"]"#,
    r#"["aeroway"="runway"]["note"="paragliding"]"#,
];

/// Raw Overpass API response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementType::Node => "node",
            ElementType::Way => "way",
            ElementType::Relation => "relation",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl From<LatLon> for Coordinates {
    fn from(p: LatLon) -> Self {
        Coordinates {
            latitude: p.lat,
            longitude: p.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bounds {
    pub minlat: f64,
    pub minlon: f64,
    pub maxlat: f64,
    pub maxlon: f64,
}

impl Bounds {
    #[must_use]
    pub fn center(&self) -> Coordinates {
        BoundingBox {
            south: self.minlat,
            west: self.minlon,
            north: self.maxlat,
            east: self.maxlon,
        }
        .center()
    }
}

/// A relation member as returned with `out geom`
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub type_: ElementType,
    #[serde(rename = "ref")]
    pub ref_: u64,
    #[serde(default)]
    pub role: String,
}

impl Member {
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.type_, self.ref_)
    }
}

/// A single element from Overpass (node, way or relation)
#[derive(Debug, Clone, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub type_: ElementType,
    pub id: u64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub center: Option<LatLon>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Way geometry; relations carry geometry on their members instead
    #[serde(default)]
    pub geometry: Option<Vec<LatLon>>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Element {
    /// `type/id`, also the path of the element on openstreetmap.org
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.type_, self.id)
    }

    #[must_use]
    pub fn is_node(&self) -> bool {
        self.type_ == ElementType::Node
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Anything that can answer "which flying features are in this box"
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch(&self, bbox: &BoundingBox) -> Result<OverpassResponse>;
}

/// Overpass QL for all free-flying features inside `bbox`
#[must_use]
pub fn build_query(bbox: &BoundingBox, timeout_seconds: u32) -> String {
    let bbox = bbox.to_overpass();
    let filters: String = SITE_FILTERS
        .iter()
        .map(|filter| format!("  nwr{filter}({bbox});\n"))
        .collect();
    format!("[out:json][timeout:{timeout_seconds}];\n(\n{filters});\nout center tags geom;\n")
}

pub fn parse_response(body: &str) -> Result<OverpassResponse> {
    serde_json::from_str(body)
        .map_err(|e| OpenglideError::api(format!("Failed to parse Overpass response: {e}")))
}

pub struct OverpassClient {
    client: ClientWithMiddleware,
    base_url: String,
    timeout_seconds: u32,
    cache: Option<Arc<PersistentCache>>,
    cache_ttl: Duration,
}

impl OverpassClient {
    pub fn new(
        config: &OverpassConfig,
        cache_config: &CacheConfig,
        cache: Option<Arc<PersistentCache>>,
    ) -> Result<Self> {
        // client timeout slightly above the server-side query timeout
        let client = http::build_client(
            Duration::from_secs(u64::from(config.timeout_seconds) + 5),
            config.max_retries,
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout_seconds: config.timeout_seconds,
            cache,
            cache_ttl: Duration::from_secs(u64::from(cache_config.sites_ttl_minutes) * 60),
        })
    }

    fn cache_key(bbox: &BoundingBox) -> String {
        format!("overpass:{}", bbox.cache_key(4))
    }

    async fn cached_body(&self, key: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache.get::<String>(key).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn query(&self, query: &str) -> Result<String> {
        let url = format!("{}?data={}", self.base_url, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OpenglideError::api(format!("Overpass request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenglideError::api(format!(
                "Overpass API returned error status: {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| OpenglideError::api(format!("Failed to read Overpass response: {e}")))
    }
}

#[async_trait]
impl FeatureSource for OverpassClient {
    #[instrument(skip(self, bbox), fields(bbox = %bbox.to_overpass()))]
    async fn fetch(&self, bbox: &BoundingBox) -> Result<OverpassResponse> {
        let key = Self::cache_key(bbox);
        if let Some(body) = self.cached_body(&key).await {
            debug!("Serving Overpass response from cache");
            return parse_response(&body);
        }

        let start = Instant::now();
        let body = self.query(&build_query(bbox, self.timeout_seconds)).await?;
        let response = parse_response(&body)?;

        info!(
            "Fetched {} elements from Overpass in {:.3}s",
            response.elements.len(),
            start.elapsed().as_secs_f64()
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_jittered(&key, body, self.cache_ttl).await {
                warn!("Failed to cache Overpass response: {}", e);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::serve_stub;
    use axum::http::StatusCode;

    fn client(base_url: String, cache: Option<Arc<PersistentCache>>) -> OverpassClient {
        let config = OverpassConfig {
            base_url: format!("{base_url}/api/interpreter"),
            max_retries: 0,
            ..OverpassConfig::default()
        };
        OverpassClient::new(&config, &CacheConfig::default(), cache).unwrap()
    }

    #[test]
    fn test_build_query() {
        let bbox = BoundingBox::new(45.0, 6.0, 46.0, 7.0).unwrap();
        let query = build_query(&bbox, 25);

        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains(r#"nwr["sport"="free_flying"](45,6,46,7);"#));
        assert!(query.contains(r#"nwr["aeroway"="runway"]["note"="paragliding"](45,6,46,7);"#));
        assert_eq!(query.matches("nwr[").count(), SITE_FILTERS.len());
        assert!(query.trim_end().ends_with("out center tags geom;"));
    }

    #[test]
    fn test_parse_overpass_response() {
        let json = r#"{
            "version": 0.6,
            "elements": [
                {"type": "node", "id": 1, "lat": 45.9, "lon": 6.1,
                 "tags": {"name": "Planfait", "free_flying:site": "launch"}},
                {"type": "way", "id": 2,
                 "center": {"lat": 45.85, "lon": 6.2},
                 "bounds": {"minlat": 45.8, "minlon": 6.1, "maxlat": 45.9, "maxlon": 6.3},
                 "geometry": [{"lat": 45.8, "lon": 6.1}, {"lat": 45.9, "lon": 6.3}],
                 "tags": {"free_flying:site": "landing"}},
                {"type": "relation", "id": 3,
                 "members": [
                    {"type": "node", "ref": 1, "role": "takeoff"},
                    {"type": "way", "ref": 2, "role": "landing",
                     "geometry": [{"lat": 45.8, "lon": 6.1}]}
                 ],
                 "tags": {"type": "site", "site": "paragliding"}}
            ]
        }"#;

        let response = parse_response(json).unwrap();
        assert_eq!(response.elements.len(), 3);
        assert!(response.elements[0].is_node());
        assert_eq!(response.elements[0].key(), "node/1");
        assert_eq!(response.elements[0].tag("name"), Some("Planfait"));
        assert_eq!(response.elements[1].center, Some(LatLon { lat: 45.85, lon: 6.2 }));
        assert_eq!(response.elements[1].geometry.as_ref().unwrap().len(), 2);
        assert_eq!(response.elements[2].key(), "relation/3");
        assert_eq!(response.elements[2].members[1].key(), "way/2");
        assert_eq!(response.elements[2].members[0].role, "takeoff");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_response("<html>rate limited</html>"),
            Err(OpenglideError::Api { .. })
        ));
    }

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds {
            minlat: 45.0,
            minlon: 6.0,
            maxlat: 46.0,
            maxlon: 8.0,
        };
        assert_eq!(bounds.center(), Coordinates { latitude: 45.5, longitude: 7.0 });
    }

    #[tokio::test]
    async fn test_fetch_sends_query_and_caches_body() {
        let (base_url, seen) = serve_stub(
            "/api/interpreter",
            StatusCode::OK,
            r#"{"elements":[{"type":"node","id":4,"lat":45.5,"lon":6.5}]}"#,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PersistentCache::open(dir.path()).unwrap());
        let client = client(base_url, Some(cache.clone()));
        let bbox = BoundingBox::new(45.0, 6.0, 46.0, 7.0).unwrap();

        let response = client.fetch(&bbox).await.unwrap();
        assert_eq!(response.elements[0].key(), "node/4");

        let query = seen.lock().unwrap()[0].clone();
        let data = query.strip_prefix("data=").unwrap();
        assert_eq!(urlencoding::decode(data).unwrap(), build_query(&bbox, 25));

        let cached = cache.get::<String>(&OverpassClient::cache_key(&bbox)).await.unwrap();
        assert!(cached.unwrap().contains("\"id\":4"));

        // the second fetch never reaches the server
        client.fetch(&bbox).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let (base_url, _) =
            serve_stub("/api/interpreter", StatusCode::TOO_MANY_REQUESTS, "rate limited").await;
        let bbox = BoundingBox::new(45.0, 6.0, 46.0, 7.0).unwrap();
        match client(base_url, None).fetch(&bbox).await {
            Err(OpenglideError::Api { message }) => assert!(message.contains("429"), "{message}"),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_serves_cached_body() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PersistentCache::open(dir.path()).unwrap());
        let bbox = BoundingBox::new(45.0, 6.0, 46.0, 7.0).unwrap();
        cache
            .put(
                &OverpassClient::cache_key(&bbox),
                r#"{"elements":[{"type":"node","id":9,"lat":45.5,"lon":6.5}]}"#.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        // unreachable endpoint: only the cache can answer
        let config = OverpassConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            ..OverpassConfig::default()
        };
        let client = OverpassClient::new(&config, &CacheConfig::default(), Some(cache)).unwrap();

        let response = client.fetch(&bbox).await.unwrap();
        assert_eq!(response.elements.len(), 1);
        assert_eq!(response.elements[0].key(), "node/9");
    }
}
