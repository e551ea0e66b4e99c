//! Error types for the fw-watcher crate.
//!
//! This module provides [`WatchError`] for the directory watcher and node
//! pipeline, and [`DeliveryError`] for batch sinks.

use camino::Utf8PathBuf;

/// Errors that can occur while scanning or watching a directory tree.
///
/// # Error Recovery Strategy
///
/// - **Root errors** ([`WatchError::Access`], [`WatchError::NotADirectory`]):
///   Fatal - the node cannot start
/// - **Per-entry errors** ([`WatchError::Walk`], [`WatchError::NonUtf8Path`],
///   [`WatchError::WatchRegistration`]): Recoverable - skip the subtree, continue
/// - **Per-event errors** ([`WatchError::PathTranslation`]): Recoverable - drop
///   the event, continue
/// - **Cancelled** ([`WatchError::Cancelled`]): not a failure, a stop was
///   requested while scanning
///
/// # Examples
///
/// ```
/// use fw_watcher::WatchError;
/// use camino::Utf8PathBuf;
///
/// let err = WatchError::NotADirectory(Utf8PathBuf::from("/etc/hosts"));
/// assert!(err.is_fatal());
/// assert!(err.to_string().contains("/etc/hosts"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to create the notification source.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watched root exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// A path could not be statted or resolved.
    #[error("cannot access {path}: {source}")]
    Access {
        /// The path that could not be accessed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be registered for notifications.
    #[error("cannot watch {path}: {source}")]
    WatchRegistration {
        /// The directory that could not be registered.
        path: Utf8PathBuf,
        /// The underlying notify error.
        #[source]
        source: notify::Error,
    },

    /// An entry could not be read during the initial walk.
    #[error("failed to walk entry: {0}")]
    Walk(#[from] walkdir::Error),

    /// An event path is not below the watched root.
    #[error("{path} is not inside watched root {root}")]
    PathTranslation {
        /// The absolute path reported by the notification.
        path: Utf8PathBuf,
        /// The watched root.
        root: Utf8PathBuf,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// A stop was requested while the initial scan was running.
    #[error("scan cancelled")]
    Cancelled,

    /// A required setting is missing.
    #[error("missing configuration value: {0}")]
    NotConfigured(&'static str),

    /// The batch sink could not be created.
    #[error("batch sink error: {0}")]
    Sink(#[from] DeliveryError),

    /// A pipeline channel was closed unexpectedly.
    #[error("channel closed unexpectedly")]
    ChannelClosed,

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WatchError {
    /// Creates a new [`WatchError::Access`] error.
    #[inline]
    pub fn access(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Access {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`WatchError::WatchRegistration`] error.
    #[inline]
    pub fn registration(path: impl Into<Utf8PathBuf>, source: notify::Error) -> Self {
        Self::WatchRegistration {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error only affects one entry or one event.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Walk(_)
                | Self::NonUtf8Path(_)
                | Self::WatchRegistration { .. }
                | Self::PathTranslation { .. }
                | Self::Cancelled
        )
    }

    /// Returns `true` if this error prevents the watcher from running.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::NotADirectory(path)
            | Self::Access { path, .. }
            | Self::WatchRegistration { path, .. }
            | Self::PathTranslation { path, .. } => Some(path),
            Self::Notify(_)
            | Self::Walk(_)
            | Self::NonUtf8Path(_)
            | Self::Cancelled
            | Self::NotConfigured(_)
            | Self::Sink(_)
            | Self::ChannelClosed
            | Self::Task(_) => None,
        }
    }
}

/// Errors reported by a batch sink.
///
/// Every delivery error is retried by the batcher; none of them drop
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The request could not be sent or timed out.
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The storage tier answered with a non-success status.
    #[error("storage rejected batch with status {0}")]
    Status(u16),

    /// The storage address does not form a valid URL.
    #[error("invalid storage address '{0}'")]
    InvalidAddress(String),

    /// The receiving end is gone.
    #[error("sink closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_access_error() {
        let err = WatchError::access(
            "/srv/data",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/data"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_translation_error_is_recoverable() {
        let err = WatchError::PathTranslation {
            path: Utf8PathBuf::from("/elsewhere/file"),
            root: Utf8PathBuf::from("/srv/data"),
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "/elsewhere/file is not inside watched root /srv/data"
        );
    }

    #[test]
    fn test_cancelled_is_not_fatal() {
        assert!(!WatchError::Cancelled.is_fatal());
        assert!(WatchError::Cancelled.path().is_none());
    }

    #[test]
    fn test_sink_error_is_fatal() {
        let err = WatchError::from(DeliveryError::InvalidAddress("::".to_owned()));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("invalid storage address"));
    }

    #[test]
    fn test_delivery_status_display() {
        assert_eq!(
            DeliveryError::Status(503).to_string(),
            "storage rejected batch with status 503"
        );
    }
}
