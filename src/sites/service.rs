use std::sync::Arc;
use tracing::{info, instrument};

use crate::Result;
use crate::config::MapConfig;
use crate::geo::{BoundingBox, Viewport};
use crate::overpass::FeatureSource;

use super::grouping::group_sites;
use super::model::SiteCollection;

/// Loads and shapes the sites visible in a viewport
pub struct SiteService {
    source: Arc<dyn FeatureSource>,
    geometry_zoom: u8,
    refetch_threshold: f64,
}

impl SiteService {
    pub fn new(source: Arc<dyn FeatureSource>, map: &MapConfig) -> Self {
        Self {
            source,
            geometry_zoom: map.geometry_zoom,
            refetch_threshold: map.refetch_threshold,
        }
    }

    #[instrument(skip(self, bbox), fields(bbox = %bbox.to_overpass()))]
    pub async fn sites_in(&self, bbox: &BoundingBox, zoom: u8) -> Result<SiteCollection> {
        let response = self.source.fetch(bbox).await?;
        let sites = group_sites(&response, zoom, self.geometry_zoom);
        info!(
            "Grouped {} elements into {} sites at zoom {}",
            response.elements.len(),
            sites.len(),
            zoom
        );
        Ok(SiteCollection::new(sites, zoom))
    }

    /// Sites for `current`, or `None` when the map has not moved far enough
    /// from `previous` to need new data.
    pub async fn sites_for_viewport(
        &self,
        current: &Viewport,
        previous: Option<&Viewport>,
    ) -> Result<Option<SiteCollection>> {
        if let Some(previous) = previous {
            if !current.should_refetch(previous, self.refetch_threshold) {
                tracing::debug!("Viewport moved less than the refetch threshold");
                return Ok(None);
            }
        }
        self.sites_in(&current.bounds, current.zoom).await.map(Some)
    }
}
