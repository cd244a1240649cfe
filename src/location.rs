//! Search query interpretation
//!
//! The search box accepts either a place name or a pair of decimal
//! coordinates such as `-12.5, 32.1`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::Coordinates;
use crate::{OpenglideError, Result};

/// Types of location input
#[derive(Debug, Clone, PartialEq)]
pub enum LocationInput {
    /// Coordinates (latitude, longitude)
    Coordinates(f64, f64),
    /// Free-text place name, geocoded upstream
    Name(String),
}

/// A resolved place the map can jump to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    /// Zoom level the map should use when centering on this location
    pub zoom: u8,
}

impl Location {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, name: String, zoom: u8) -> Self {
        Self {
            latitude,
            longitude,
            name,
            zoom,
        }
    }
}

pub struct LocationParser;

impl LocationParser {
    /// Parse search box input
    pub fn parse(input: &str) -> Result<LocationInput> {
        let input = input.trim();
        if input.is_empty() {
            return Err(OpenglideError::validation("Search query cannot be empty"));
        }

        if let Some((lat, lon)) = Self::parse_coordinates(input) {
            if Coordinates::new(lat, lon).is_ok() {
                return Ok(LocationInput::Coordinates(lat, lon));
            }
            debug!("Coordinates out of range, treating '{}' as a place name", input);
        }

        Ok(LocationInput::Name(input.to_string()))
    }

    /// `<decimal> , <decimal>` with optional whitespace around the comma
    fn parse_coordinates(input: &str) -> Option<(f64, f64)> {
        let (lat, lon) = input.split_once(',')?;
        let (lat, lon) = (lat.trim(), lon.trim());
        if !Self::is_plain_decimal(lat) || !Self::is_plain_decimal(lon) {
            return None;
        }
        Some((lat.parse().ok()?, lon.parse().ok()?))
    }

    /// Matches `-?\d+(\.\d+)?`
    fn is_plain_decimal(value: &str) -> bool {
        let digits = value.strip_prefix('-').unwrap_or(value);
        let (int, frac) = match digits.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (digits, None),
        };

        let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        all_digits(int) && frac.is_none_or(all_digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("46.8182,8.2275", 46.8182, 8.2275)]
    #[case("  -12.5 ,  32.1 ", -12.5, 32.1)]
    #[case("45, 6", 45.0, 6.0)]
    #[case("-46.8182, -8.2275", -46.8182, -8.2275)]
    fn test_parse_coordinates(#[case] input: &str, #[case] lat: f64, #[case] lon: f64) {
        assert_eq!(
            LocationParser::parse(input).unwrap(),
            LocationInput::Coordinates(lat, lon)
        );
    }

    #[rstest]
    #[case("Interlaken")]
    #[case("Annecy, France")]
    #[case("46.8182 8.2275")]
    #[case("46.0,8.0,0.0")]
    #[case("+46.0,8.0")]
    #[case("46.,8.0")]
    #[case(".5,8.0")]
    #[case("1e3,8.0")]
    #[case("91.0,8.0")]
    #[case("46.0,-181.0")]
    fn test_parse_names(#[case] input: &str) {
        assert_eq!(
            LocationParser::parse(input).unwrap(),
            LocationInput::Name(input.trim().to_string())
        );
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!(matches!(
            LocationParser::parse("   "),
            Err(OpenglideError::Validation { .. })
        ));
    }
}
