//! Configuration management for `openglide`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::OpenglideError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenglideConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Overpass API settings
    #[serde(default)]
    pub overpass: OverpassConfig,
    /// Nominatim geocoder settings
    #[serde(default)]
    pub nominatim: NominatimConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Map behaviour shared with the browser
    #[serde(default)]
    pub map: MapConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
    /// Budget for one Overpass or Nominatim lookup including retries.
    /// Must stay below `request_timeout_seconds` so a slow upstream still
    /// gets a JSON error instead of the bare request timeout.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_seconds: u32,
    /// Directory with the map page and its assets
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// Overpass API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    /// Interpreter endpoint
    #[serde(default = "default_overpass_url")]
    pub base_url: String,
    /// Server-side query timeout in seconds (`[timeout:N]`)
    #[serde(default = "default_overpass_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Nominatim geocoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominatimConfig {
    /// Base URL, `/search` is appended
    #[serde(default = "default_nominatim_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_nominatim_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Number of suggestions shown under the search box
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: u32,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether responses are cached at all
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// TTL for Overpass responses in minutes
    #[serde(default = "default_sites_ttl")]
    pub sites_ttl_minutes: u32,
    /// TTL for geocoding responses in hours
    #[serde(default = "default_geocode_ttl")]
    pub geocode_ttl_hours: u32,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Map view settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Initial latitude when no location is given
    #[serde(default = "default_center_lat")]
    pub default_latitude: f64,
    /// Initial longitude when no location is given
    #[serde(default = "default_center_lon")]
    pub default_longitude: f64,
    /// Initial zoom when no location is given
    #[serde(default = "default_zoom")]
    pub default_zoom: u8,
    /// Zoom used after jumping to a search result
    #[serde(default = "default_search_zoom")]
    pub search_zoom: u8,
    /// Zoom at which non-node features are drawn as geometry
    #[serde(default = "default_geometry_zoom")]
    pub geometry_zoom: u8,
    /// Fraction of the view the center must move before refetching
    #[serde(default = "default_refetch_threshold")]
    pub refetch_threshold: f64,
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_request_timeout() -> u32 {
    30
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_overpass_timeout() -> u32 {
    25
}

fn default_upstream_timeout() -> u32 {
    27
}

fn default_max_retries() -> u32 {
    3
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_nominatim_timeout() -> u32 {
    10
}

fn default_max_suggestions() -> u32 {
    8
}

fn default_cache_enabled() -> bool {
    true
}

fn default_sites_ttl() -> u32 {
    60
}

fn default_geocode_ttl() -> u32 {
    24 * 7
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("openglide").to_string_lossy().into_owned())
        .unwrap_or_else(|| ".cache/openglide".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_center_lat() -> f64 {
    39.8283
}

fn default_center_lon() -> f64 {
    -98.5795
}

fn default_zoom() -> u8 {
    4
}

fn default_search_zoom() -> u8 {
    12
}

fn default_geometry_zoom() -> u8 {
    14
}

fn default_refetch_threshold() -> f64 {
    0.10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            request_timeout_seconds: default_request_timeout(),
            upstream_timeout_seconds: default_upstream_timeout(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            base_url: default_overpass_url(),
            timeout_seconds: default_overpass_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: default_nominatim_url(),
            timeout_seconds: default_nominatim_timeout(),
            max_retries: default_max_retries(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            sites_ttl_minutes: default_sites_ttl(),
            geocode_ttl_hours: default_geocode_ttl(),
            location: default_cache_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_latitude: default_center_lat(),
            default_longitude: default_center_lon(),
            default_zoom: default_zoom(),
            search_zoom: default_search_zoom(),
            geometry_zoom: default_geometry_zoom(),
            refetch_threshold: default_refetch_threshold(),
        }
    }
}

impl OpenglideConfig {
    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // OPENGLIDE_OVERPASS__BASE_URL and friends
        builder = builder.add_source(
            Environment::with_prefix("OPENGLIDE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: OpenglideConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("openglide").join("config.toml"))
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.server.listen_address.is_empty() {
            self.server.listen_address = default_listen_address();
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = default_request_timeout();
        }
        if self.server.upstream_timeout_seconds == 0 {
            self.server.upstream_timeout_seconds = default_upstream_timeout();
        }
        if self.server.static_dir.is_empty() {
            self.server.static_dir = default_static_dir();
        }
        if self.overpass.base_url.is_empty() {
            self.overpass.base_url = default_overpass_url();
        }
        if self.overpass.timeout_seconds == 0 {
            self.overpass.timeout_seconds = default_overpass_timeout();
        }
        if self.nominatim.base_url.is_empty() {
            self.nominatim.base_url = default_nominatim_url();
        }
        if self.nominatim.timeout_seconds == 0 {
            self.nominatim.timeout_seconds = default_nominatim_timeout();
        }
        if self.nominatim.max_suggestions == 0 {
            self.nominatim.max_suggestions = default_max_suggestions();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Parsed listen address
    pub fn listen_address(&self) -> Result<SocketAddr> {
        self.server
            .listen_address
            .parse()
            .map_err(|_| {
                OpenglideError::config(format!(
                    "Invalid listen address '{}'",
                    self.server.listen_address
                ))
                .into()
            })
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.server.request_timeout_seconds > 300 {
            return Err(OpenglideError::config("Request timeout cannot exceed 300 seconds").into());
        }

        if self.server.upstream_timeout_seconds >= self.server.request_timeout_seconds {
            return Err(OpenglideError::config(format!(
                "Upstream timeout ({}s) must be shorter than the request timeout ({}s)",
                self.server.upstream_timeout_seconds, self.server.request_timeout_seconds
            ))
            .into());
        }

        if self.overpass.timeout_seconds > 180 {
            return Err(OpenglideError::config("Overpass timeout cannot exceed 180 seconds").into());
        }

        if self.overpass.max_retries > 10 || self.nominatim.max_retries > 10 {
            return Err(OpenglideError::config("Max retries cannot exceed 10").into());
        }

        if self.nominatim.max_suggestions > 50 {
            return Err(OpenglideError::config("Maximum suggestions cannot exceed 50").into());
        }

        if self.cache.geocode_ttl_hours > 24 * 30 {
            return Err(OpenglideError::config("Geocode cache TTL cannot exceed 30 days").into());
        }

        if !(-90.0..=90.0).contains(&self.map.default_latitude)
            || !(-180.0..=180.0).contains(&self.map.default_longitude)
        {
            return Err(OpenglideError::config("Default map center is out of range").into());
        }

        if self.map.default_zoom > 19 || self.map.search_zoom > 19 || self.map.geometry_zoom > 19 {
            return Err(OpenglideError::config("Zoom levels cannot exceed 19").into());
        }

        if !(0.0..1.0).contains(&self.map.refetch_threshold) {
            return Err(
                OpenglideError::config("Refetch threshold must be in the range [0, 1)").into(),
            );
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(OpenglideError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(OpenglideError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Overpass", &self.overpass.base_url),
            ("Nominatim", &self.nominatim.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(OpenglideError::config(format!(
                    "{name} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        self.listen_address()?;

        Ok(())
    }
}
