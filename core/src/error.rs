//! Error types for TextSync

use thiserror::Error;

/// Errors that can occur while applying, transforming or synchronizing operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Malformed operation: negative offset, out-of-range insert, or a remove
    /// whose text does not match the live content
    #[error("Invalid operation: {0}")]
    Validation(String),

    /// The operation was tagged with a version other than the expected one
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// No outbound channel is currently able to deliver the message
    #[error("Channel unavailable")]
    ChannelUnavailable,

    /// An operation that must carry a server-assigned version does not
    #[error("Operation has no version")]
    MissingVersion,

    /// A wire message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session actor is no longer running
    #[error("Session closed")]
    SessionClosed,
}

impl SyncError {
    /// Whether the caller can recover by resynchronizing or retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::VersionConflict { .. } | SyncError::ChannelUnavailable
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

/// Result type for TextSync operations
pub type Result<T> = std::result::Result<T, SyncError>;
