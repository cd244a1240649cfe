//! Shaping raw Overpass elements into sites and their member features
//!
//! Relations describing a flying site pull in the launches and landings they
//! reference; those members are listed under the site instead of as sites of
//! their own. Everything left over becomes a standalone site.

use std::collections::{HashMap, HashSet};

use crate::geo::{BoundingBox, Coordinates};
use crate::overpass::{Element, ElementType, LatLon, OverpassResponse};

use super::model::{
    FeatureKind, GeoJsonGeometry, MemberFeature, OSM_BASE_URL, Rendering, Site, UNNAMED_SITE,
};

#[must_use]
pub fn osm_url(key: &str) -> String {
    format!("{OSM_BASE_URL}/{key}")
}

#[must_use]
pub fn element_name(element: &Element) -> String {
    element
        .tag("name")
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(UNNAMED_SITE)
        .to_string()
}

/// Best single coordinate for an element on its own.
///
/// Node position, then the Overpass-computed center, then the midpoint of
/// the geometry's bounding box, then the midpoint of `bounds`.
#[must_use]
pub fn element_center(element: &Element) -> Option<Coordinates> {
    if element.is_node() {
        if let (Some(latitude), Some(longitude)) = (element.lat, element.lon) {
            return Some(Coordinates {
                latitude,
                longitude,
            });
        }
    }

    if let Some(center) = element.center {
        return Some(center.into());
    }

    if let Some(center) = element
        .geometry
        .as_deref()
        .and_then(|points| BoundingBox::from_points(points.iter().copied().map(Coordinates::from)))
        .map(|bbox| bbox.center())
    {
        return Some(center);
    }

    element.bounds.map(|bounds| bounds.center())
}

/// Polygon for closed rings of more than two points, line string otherwise
#[must_use]
pub fn geojson_geometry(points: &[LatLon]) -> GeoJsonGeometry {
    let coords: Vec<[f64; 2]> = points
        .iter()
        .map(|p| Coordinates::from(*p).to_geojson_position())
        .collect();
    let closed = coords.len() > 2 && coords.first() == coords.last();
    if closed {
        GeoJsonGeometry::Polygon(vec![coords])
    } else {
        GeoJsonGeometry::LineString(coords)
    }
}

/// How `element` is drawn at `zoom`, `None` when it cannot be drawn.
///
/// Nodes and relations are always markers. Ways become markers below
/// `geometry_zoom` and their outline at or above it; a way with no
/// outline keeps its marker.
#[must_use]
pub fn rendering_for(
    element: &Element,
    center: Option<Coordinates>,
    zoom: u8,
    geometry_zoom: u8,
) -> Option<Rendering> {
    if element.type_ == ElementType::Way && zoom >= geometry_zoom {
        if let Some(points) = element.geometry.as_deref().filter(|p| !p.is_empty()) {
            return Some(Rendering::Geometry {
                geometry: geojson_geometry(points),
            });
        }
    }
    center.map(|position| Rendering::Marker { position })
}

fn member_feature(
    element: &Element,
    role: &str,
    zoom: u8,
    geometry_zoom: u8,
) -> MemberFeature {
    let key = element.key();
    let center = element_center(element);
    let kind = match FeatureKind::classify(element) {
        FeatureKind::Other => FeatureKind::from_role(role),
        kind => kind,
    };
    MemberFeature {
        osm_url: osm_url(&key),
        key,
        name: element_name(element),
        kind,
        role: role.to_string(),
        center,
        rendering: rendering_for(element, center, zoom, geometry_zoom),
        tags: element.tags.clone(),
    }
}

/// Display coordinate of a site relation.
///
/// Its own center when Overpass computed one, else the first launch, else
/// the midpoint of all member centers, else its `bounds` midpoint.
#[must_use]
pub fn site_center(relation: &Element, members: &[MemberFeature]) -> Option<Coordinates> {
    if let Some(center) = relation.center {
        return Some(center.into());
    }

    if let Some(launch) = members
        .iter()
        .filter(|m| m.kind == FeatureKind::Launch)
        .find_map(|m| m.center)
    {
        return Some(launch);
    }

    BoundingBox::from_points(members.iter().filter_map(|m| m.center))
        .map(|bbox| bbox.center())
        .or_else(|| relation.bounds.map(|bounds| bounds.center()))
}

/// Group a response into displayable sites, preserving response order.
///
/// Nodes and ways referenced by a displayed relation are listed under it.
/// Member relations are never nested; each relation stays a site of its own
/// with its own members.
#[must_use]
pub fn group_sites(response: &OverpassResponse, zoom: u8, geometry_zoom: u8) -> Vec<Site> {
    let index: HashMap<String, &Element> = response
        .elements
        .iter()
        .map(|element| (element.key(), element))
        .collect();

    let mut relation_sites: HashMap<String, Site> = response
        .elements
        .iter()
        .filter(|element| element.type_ == ElementType::Relation)
        .filter_map(|relation| {
            let members: Vec<MemberFeature> = relation
                .members
                .iter()
                .filter(|member| member.type_ != ElementType::Relation)
                .filter_map(|member| {
                    index
                        .get(&member.key())
                        .map(|child| member_feature(child, &member.role, zoom, geometry_zoom))
                })
                .collect();
            let center = site_center(relation, &members);
            build_site(relation, center, members, zoom, geometry_zoom)
                .map(|site| (site.key.clone(), site))
        })
        .collect();

    let grouped: HashSet<String> = relation_sites
        .values()
        .flat_map(|site| site.members.iter())
        .map(|member| member.key.clone())
        .collect();

    let mut sites = Vec::new();
    for element in &response.elements {
        let key = element.key();
        if element.type_ == ElementType::Relation {
            if let Some(site) = relation_sites.remove(&key) {
                sites.push(site);
            }
        } else if !grouped.contains(&key) {
            if let Some(site) =
                build_site(element, element_center(element), Vec::new(), zoom, geometry_zoom)
            {
                sites.push(site);
            }
        }
    }

    sites
}

fn build_site(
    element: &Element,
    center: Option<Coordinates>,
    members: Vec<MemberFeature>,
    zoom: u8,
    geometry_zoom: u8,
) -> Option<Site> {
    let key = element.key();
    let (Some(center), Some(rendering)) =
        (center, rendering_for(element, center, zoom, geometry_zoom))
    else {
        tracing::debug!("Dropping {} without a usable position", key);
        return None;
    };

    Some(Site {
        osm_url: osm_url(&key),
        key,
        name: element_name(element),
        kind: FeatureKind::classify(element),
        center,
        rendering,
        tags: element.tags.clone(),
        members,
    })
}
