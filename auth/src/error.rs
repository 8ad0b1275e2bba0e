//! Error types for session operations.

use session_guard_runtime::StoreError;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error taxonomy for the session layer.
///
/// Most of these never reach consumers: the gateway degrades storage
/// failures to "not persisted", and hand-off or provider sign-out failures
/// are logged and swallowed by the reducer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// Durable storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored value could not be parsed.
    #[error("Malformed stored value under {key}: {reason}")]
    MalformedRecord {
        /// Storage key holding the value
        key: String,
        /// Parser message
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Collaborator Errors
    // ═══════════════════════════════════════════════════════════

    /// The identity provider rejected or failed a request.
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// The token hand-off collaborator failed.
    #[error("Token hand-off failed: {0}")]
    HandOff(String),

    // ═══════════════════════════════════════════════════════════
    // Lifecycle Errors
    // ═══════════════════════════════════════════════════════════

    /// Invalid configuration value.
    #[error("Invalid configuration for {key}: {reason}")]
    Config {
        /// Configuration key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// The session manager has been disposed.
    #[error("Session manager disposed")]
    Disposed,

    /// The store runtime rejected an action.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl SessionError {
    /// Returns `true` for failures of durable storage access or content.
    ///
    /// # Examples
    ///
    /// ```
    /// # use session_guard_auth::SessionError;
    /// assert!(SessionError::Storage("quota".into()).is_storage_error());
    /// assert!(!SessionError::Disposed.is_storage_error());
    /// ```
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::MalformedRecord { .. })
    }
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ShutdownInProgress => Self::Disposed,
            other => Self::Runtime(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
