//! Error types for the fw-master crate.

/// Boxed error from an inventory source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the master tier.
///
/// # Error Recovery Strategy
///
/// - **[`MasterError::BackendUnavailable`]**: Recoverable - the query handler
///   serves the cached inventory, or `502 Bad Gateway` when there is none
/// - **Startup errors** ([`MasterError::Bind`], [`MasterError::Client`],
///   [`MasterError::InvalidAddress`], [`MasterError::NotConfigured`]): the
///   master does not start
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// The storage listing call could not complete.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(#[source] BoxError),

    /// The query listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The configured address.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The storage client could not be built.
    #[error("failed to build storage client: {0}")]
    Client(#[source] reqwest::Error),

    /// The storage address does not form a valid URL.
    #[error("invalid storage address '{0}'")]
    InvalidAddress(String),

    /// A required setting is missing.
    #[error("missing configuration value: {0}")]
    NotConfigured(&'static str),
}

impl MasterError {
    /// Wraps a source error as [`MasterError::BackendUnavailable`].
    pub fn backend(error: impl Into<BoxError>) -> Self {
        Self::BackendUnavailable(error.into())
    }

    /// Returns `true` if the query handler can fall back to the cache.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}
