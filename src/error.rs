//! Error types for the rating service
//!
//! Domain errors are typed so the vote gate can map them onto status codes;
//! wiring code (configuration, service start-up) uses anyhow like the rest
//! of the binary.

/// Result type alias for rating operations
pub type Result<T> = std::result::Result<T, RatingError>;

/// Failure reported by an aggregate storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Storage write failed: {message}")]
    WriteFailed { message: String },

    #[error("Storage lock poisoned: {resource}")]
    LockPoisoned { resource: String },
}

/// Errors surfaced by the rating store and the vote gate
#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid vote request: {reason}")]
    Validation { reason: String },
}

impl RatingError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Validation { .. })
    }
}
