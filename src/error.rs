//! Error types and handling for the METAR map

use thiserror::Error;

/// Main error type for the METAR map
#[derive(Error, Debug)]
pub enum MetarMapError {
    /// Configuration-related errors, always fatal at startup
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network or transport failures while fetching observations
    #[error("Fetch error: {message}")]
    Fetch { message: String },

    /// Malformed weather API responses
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// LED sink failures
    #[error("Render error: {message}")]
    Render { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MetarMapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(message: S) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Whether the main loop may keep running after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Parse { .. } | Self::Render { .. })
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            MetarMapError::Config { message } => {
                format!("Configuration error: {message}. Please check your config file.")
            }
            MetarMapError::Fetch { .. } => {
                "Unable to reach the weather service. Keeping previous data.".to_string()
            }
            MetarMapError::Parse { .. } => {
                "The weather service returned data that could not be read.".to_string()
            }
            MetarMapError::Render { .. } => {
                "Failed to update the LED strip. Please check the LED output.".to_string()
            }
            MetarMapError::Io { .. } => {
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
        let config_err = MetarMapError::config("airports mismatch");
        assert!(matches!(config_err, MetarMapError::Config { .. }));

        let fetch_err = MetarMapError::fetch("timed out");
        assert!(matches!(fetch_err, MetarMapError::Fetch { .. }));

        let render_err = MetarMapError::render("device gone");
        assert!(matches!(render_err, MetarMapError::Render { .. }));
    }

    #[test]
    fn test_recoverable() {
        assert!(!MetarMapError::config("x").is_recoverable());
        assert!(MetarMapError::fetch("x").is_recoverable());
        assert!(MetarMapError::parse("x").is_recoverable());
        assert!(MetarMapError::render("x").is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let config_err = MetarMapError::config("led count 19");
        assert!(config_err.user_message().contains("led count 19"));

        let fetch_err = MetarMapError::fetch("test");
        assert!(fetch_err.user_message().contains("Keeping previous data"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err: MetarMapError = io_err.into();
        assert!(matches!(err, MetarMapError::Io { .. }));
    }
}
