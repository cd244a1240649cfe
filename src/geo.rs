//! Coordinates, bounding boxes and the map viewport

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};

use crate::{OpenglideError, Result};

/// A point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates, rejecting values outside the WGS84 range
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(OpenglideError::validation(format!(
                "Latitude must be between -90 and 90, got: {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(OpenglideError::validation(format!(
                "Longitude must be between -180 and 180, got: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parse `"lat,lon"`
    pub fn parse(input: &str) -> Result<Self> {
        let Some((lat, lon)) = input.split_once(',') else {
            return Err(OpenglideError::validation(format!(
                "Position must be 'latitude,longitude', got: '{input}'"
            )));
        };
        let number = |part: &str| {
            part.trim().parse::<f64>().map_err(|_| {
                OpenglideError::validation(format!("Position value '{}' is not a number", part.trim()))
            })
        };
        Self::new(number(lat)?, number(lon)?)
    }

    /// `[lon, lat]` as GeoJSON orders positions
    #[must_use]
    pub fn to_geojson_position(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Great-circle distance in kilometers
#[must_use]
pub fn distance_km(from: &Coordinates, to: &Coordinates) -> f64 {
    distance(
        HaversineLocation {
            latitude: from.latitude,
            longitude: from.longitude,
        },
        HaversineLocation {
            latitude: to.latitude,
            longitude: to.longitude,
        },
        Units::Kilometers,
    )
}

/// Axis-aligned box, south-west to north-east
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self> {
        Coordinates::new(south, west)?;
        Coordinates::new(north, east)?;
        if south > north {
            return Err(OpenglideError::validation(format!(
                "South edge {south} lies north of north edge {north}"
            )));
        }
        if west > east {
            return Err(OpenglideError::validation(format!(
                "West edge {west} lies east of east edge {east}"
            )));
        }
        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }

    /// Parse `"south,west,north,east"`
    pub fn parse(input: &str) -> Result<Self> {
        let [south, west, north, east] = parse_edges(input)?;
        Self::new(south, west, north, east)
    }

    /// Parse a map viewport, pulling edges back into the valid range.
    ///
    /// Leaflet reports unwrapped longitudes (e.g. -182.9) when a low zoom
    /// view is wider than the world or sits across the antimeridian.
    pub fn parse_clamped(input: &str) -> Result<Self> {
        let [south, west, north, east] = parse_edges(input)?;
        Self::new(
            south.clamp(-90.0, 90.0),
            west.clamp(-180.0, 180.0),
            north.clamp(-90.0, 90.0),
            east.clamp(-180.0, 180.0),
        )
    }

    /// Tight box around the given points
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinates>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    south: p.latitude,
                    west: p.longitude,
                    north: p.latitude,
                    east: p.longitude,
                },
                Some(b) => Self {
                    south: b.south.min(p.latitude),
                    west: b.west.min(p.longitude),
                    north: b.north.max(p.latitude),
                    east: b.east.max(p.longitude),
                },
            })
        })
    }

    /// Filter argument for Overpass QL: `s,w,n,e`
    #[must_use]
    pub fn to_overpass(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }

    /// Midpoint of the box
    #[must_use]
    pub fn center(&self) -> Coordinates {
        Coordinates {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }

    #[must_use]
    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    #[must_use]
    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }

    /// Stable key with the edges rounded to `precision` decimals
    #[must_use]
    pub fn cache_key(&self, precision: usize) -> String {
        format!(
            "{:.p$}:{:.p$}:{:.p$}:{:.p$}",
            self.south,
            self.west,
            self.north,
            self.east,
            p = precision
        )
    }
}

fn parse_edges(input: &str) -> Result<[f64; 4]> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(OpenglideError::validation(format!(
            "Bounding box must be 'south,west,north,east', got: '{input}'"
        )));
    }

    let mut values = [0.0_f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| {
            OpenglideError::validation(format!("Bounding box value '{part}' is not a number"))
        })?;
    }
    Ok(values)
}

/// What the map currently shows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Coordinates,
    pub zoom: u8,
    pub bounds: BoundingBox,
}

impl Viewport {
    #[must_use]
    pub fn new(bounds: BoundingBox, zoom: u8) -> Self {
        Self {
            center: bounds.center(),
            zoom,
            bounds,
        }
    }

    /// Whether features must be queried again after moving from `previous`.
    ///
    /// True when the map zoomed out, or when the center moved further than
    /// `threshold` of the current view in either axis.
    #[must_use]
    pub fn should_refetch(&self, previous: &Viewport, threshold: f64) -> bool {
        if self.zoom < previous.zoom {
            return true;
        }

        let lat_diff = (self.center.latitude - previous.center.latitude).abs();
        let lon_diff = (self.center.longitude - previous.center.longitude).abs();

        lat_diff > self.bounds.lat_span() * threshold
            || lon_diff > self.bounds.lon_span() * threshold
    }
}
