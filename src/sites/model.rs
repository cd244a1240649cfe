//! Site data types sent to the map

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geo::{Coordinates, distance_km};
use crate::overpass::{Element, ElementType};

pub const UNNAMED_SITE: &str = "(Unnamed paragliding site)";
pub const OSM_BASE_URL: &str = "https://www.openstreetmap.org";

/// What an OSM feature is in free-flying terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// A relation grouping launches and landings
    Site,
    Launch,
    Landing,
    Other,
}

impl FeatureKind {
    #[must_use]
    pub fn classify(element: &Element) -> Self {
        match element.tag("free_flying:site") {
            Some("launch" | "takeoff") => return FeatureKind::Launch,
            Some("landing") => return FeatureKind::Landing,
            _ => {}
        }

        if element.type_ == ElementType::Relation
            && (element.tag("type") == Some("site")
                || element.tags.contains_key("site")
                || element.tag("sport") == Some("free_flying"))
        {
            return FeatureKind::Site;
        }

        FeatureKind::Other
    }

    /// Kind implied by a relation member role
    #[must_use]
    pub fn from_role(role: &str) -> Self {
        match role {
            "launch" | "takeoff" => FeatureKind::Launch,
            "landing" => FeatureKind::Landing,
            _ => FeatureKind::Other,
        }
    }
}

/// GeoJSON geometry, positions as `[lon, lat]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeoJsonGeometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    LineString(Vec<[f64; 2]>),
}

/// How the browser should draw a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rendering {
    Marker { position: Coordinates },
    Geometry { geometry: GeoJsonGeometry },
}

/// A launch, landing or other feature belonging to a site relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFeature {
    pub key: String,
    pub name: String,
    pub kind: FeatureKind,
    pub role: String,
    pub osm_url: String,
    pub center: Option<Coordinates>,
    pub rendering: Option<Rendering>,
    pub tags: BTreeMap<String, String>,
}

/// One entry of the site list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub key: String,
    pub name: String,
    pub kind: FeatureKind,
    pub osm_url: String,
    /// Display coordinate, where the list entry pans to
    pub center: Coordinates,
    pub rendering: Rendering,
    pub tags: BTreeMap<String, String>,
    pub members: Vec<MemberFeature>,
}

impl Site {
    /// Tag rows for the details popup, sorted by key
    #[must_use]
    pub fn tag_info(&self) -> Vec<(&str, &str)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Result of one viewport query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCollection {
    pub sites: Vec<Site>,
    pub zoom: u8,
    pub fetched_at: DateTime<Utc>,
}

impl SiteCollection {
    #[must_use]
    pub fn new(sites: Vec<Site>, zoom: u8) -> Self {
        Self {
            sites,
            zoom,
            fetched_at: Utc::now(),
        }
    }

    /// Closest sites first
    pub fn sort_by_distance(&mut self, from: &Coordinates) {
        self.sites.sort_by(|a, b| {
            distance_km(from, &a.center).total_cmp(&distance_km(from, &b.center))
        });
    }
}
