//! `openglide` - map server for paragliding and free-flying sites
//!
//! Sites come from OpenStreetMap through the Overpass API, place search goes
//! through Nominatim. This library groups the raw features into sites with
//! their launches and landings and serves them to the map page as JSON.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod http;
pub mod location;
pub mod logging;
pub mod nominatim;
pub mod overpass;
pub mod search;
pub mod sites;
pub mod web;

// Re-export core types for public API
pub use api::AppState;
pub use cache::PersistentCache;
pub use config::OpenglideConfig;
pub use error::OpenglideError;
pub use geo::{BoundingBox, Coordinates, Viewport};
pub use location::{Location, LocationInput, LocationParser};
pub use nominatim::{Geocoder, NominatimClient, Place};
pub use overpass::{FeatureSource, OverpassClient, OverpassResponse};
pub use search::{SearchService, Suggestion};
pub use sites::{Site, SiteCollection, SiteService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, OpenglideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
