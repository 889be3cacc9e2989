//! Error types for dashnet

use std::io;
use thiserror::Error;

/// Result type alias for dashnet operations
pub type Result<T> = std::result::Result<T, DashnetError>;

/// Main error type for snapshot loading, filtering and rendering
#[derive(Error, Debug)]
pub enum DashnetError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The filter text is not a valid regular expression
    #[error("Invalid filter '{pattern}': {source}")]
    InvalidFilter {
        /// Text entered by the user
        pattern: String,
        /// Compilation error reported by the regex engine
        source: regex::Error,
    },

    /// The terminal cannot hold the dashboard layout
    #[error(
        "Terminal too small: {width}x{height}, dashnet needs at least {min_width}x{min_height}"
    )]
    TerminalTooSmall {
        /// Current terminal width in columns
        width: u16,
        /// Current terminal height in rows
        height: u16,
        /// Minimum width in columns
        min_width: u16,
        /// Minimum height in rows
        min_height: u16,
    },

    /// Unsupported platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DashnetError {
    /// Whether the error must stop the dashboard.
    ///
    /// Only a render surface that is too small is fatal; everything else is
    /// reported and the refresh cadence continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DashnetError::TerminalTooSmall { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_terminal_size_is_fatal() {
        let small = DashnetError::TerminalTooSmall {
            width: 10,
            height: 5,
            min_width: 60,
            min_height: 12,
        };
        assert!(small.is_fatal());
        assert!(!DashnetError::ConfigError("bad line".into()).is_fatal());
        assert!(!DashnetError::Io(io::Error::from(io::ErrorKind::NotFound)).is_fatal());
    }

    #[test]
    fn test_invalid_filter_message_names_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = DashnetError::InvalidFilter {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Invalid filter '('"));
    }
}
