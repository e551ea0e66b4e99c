//! Error types for the fw-storage crate.

use camino::Utf8PathBuf;

/// Errors that can occur in the storage tier.
///
/// Snapshot errors fail only the batch being applied; the in-memory state
/// keeps the batch and the next successful write catches the file up.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The snapshot file could not be read or written.
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// The snapshot (or temporary) file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be encoded or decoded.
    #[error("invalid snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The configured address.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A required setting is missing.
    #[error("missing configuration value: {0}")]
    NotConfigured(&'static str),
}

impl StorageError {
    /// Creates a new [`StorageError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_display() {
        let err = StorageError::io(
            "/var/lib/fw.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "snapshot I/O failed for /var/lib/fw.json: denied"
        );
    }

    #[test]
    fn test_bind_display() {
        let err = StorageError::Bind {
            address: "127.0.0.1:1".to_owned(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:1"));
    }
}
