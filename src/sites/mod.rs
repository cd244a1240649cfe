//! Free-flying sites
//!
//! This module turns Overpass answers into what the map and the side panel show:
//! - Site relations with their launches and landings as members
//! - Standalone launches, landings and other tagged features
//! - A display coordinate and a marker or outline for each of them

pub mod grouping;
pub mod model;
pub mod service;

pub use grouping::{element_center, element_name, group_sites, osm_url};
pub use model::{
    FeatureKind, GeoJsonGeometry, MemberFeature, Rendering, Site, SiteCollection, UNNAMED_SITE,
};
pub use service::SiteService;
