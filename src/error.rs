//! Error types and handling for `openglide`

use thiserror::Error;

/// Main error type for the `openglide` server
#[derive(Error, Debug)]
pub enum OpenglideError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Upstream service errors (Overpass, Nominatim)
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Nothing matched a lookup
    #[error("{message}")]
    NotFound { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl OpenglideError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            OpenglideError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
            OpenglideError::Api { .. } => {
                "Unable to reach OpenStreetMap services. Please try again later.".to_string()
            }
            OpenglideError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            OpenglideError::NotFound { message } => message.clone(),
            OpenglideError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            OpenglideError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = OpenglideError::config("bad listen address");
        assert!(matches!(config_err, OpenglideError::Config { .. }));

        let api_err = OpenglideError::api("connection failed");
        assert!(matches!(api_err, OpenglideError::Api { .. }));

        let validation_err = OpenglideError::validation("invalid bbox");
        assert!(matches!(validation_err, OpenglideError::Validation { .. }));

        let not_found = OpenglideError::not_found("No results found for \"x\".");
        assert!(matches!(not_found, OpenglideError::NotFound { .. }));
    }

    #[test]
    fn test_user_messages() {
        let api_err = OpenglideError::api("timeout");
        assert!(api_err.user_message().contains("OpenStreetMap"));

        let validation_err = OpenglideError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));

        let not_found = OpenglideError::not_found("No results found for \"Nowhere\".");
        assert_eq!(not_found.user_message(), "No results found for \"Nowhere\".");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OpenglideError = io_err.into();
        assert!(matches!(err, OpenglideError::Io { .. }));
    }
}
