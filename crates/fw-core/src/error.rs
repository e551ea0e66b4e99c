//! Error types for the fw-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related
//! errors that can occur across the workspace.

use camino::Utf8PathBuf;

/// Errors that can occur while loading configuration.
///
/// None of these are fatal: callers log them and continue with defaults.
///
/// # Examples
///
/// ```
/// use fw_core::ConfigError;
/// use camino::Utf8PathBuf;
///
/// let error = ConfigError::Missing(Utf8PathBuf::from("/etc/filewatcher.json"));
/// assert!(error.to_string().contains("/etc/filewatcher.json"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    Missing(Utf8PathBuf),

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::Io`] error, mapping `NotFound` to
    /// [`ConfigError::Missing`].
    #[must_use]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::Missing(path)
        } else {
            Self::Io { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_not_found_maps_to_missing() {
        let err = ConfigError::io("cfg.json", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, ConfigError::Missing(_)));
        assert_eq!(err.to_string(), "configuration file not found: cfg.json");
    }

    #[test]
    fn test_other_io_error_keeps_source() {
        let err = ConfigError::io(
            "cfg.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cfg.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_parse_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").err();
        let Some(source) = source else {
            panic!("expected a parse error");
        };
        let err = ConfigError::from(source);
        assert!(err.to_string().starts_with("failed to parse configuration"));
    }
}
