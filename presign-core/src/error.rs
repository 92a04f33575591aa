//! Error types for PRESIGN.
//!
//! Resolution failures are modelled separately as [`ResolveError`]: they are
//! stored in cache state and published to subscribers, so they must be cheap
//! to clone. Everything else goes through [`PresignError`].

use thiserror::Error;

/// Result type alias using `PresignError`.
pub type Result<T> = std::result::Result<T, PresignError>;

/// Failure of a single batch resolution.
///
/// A partial response (some requested paths missing) is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The backend could not be reached or its response could not be read.
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying transport failure
        reason: String,
    },

    /// The backend answered but reported failure.
    #[error("backend rejected request: {reason}")]
    BackendRejected {
        /// Reason reported by the backend
        reason: String,
    },
}

impl ResolveError {
    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        ResolveError::Transport {
            reason: reason.into(),
        }
    }

    /// Creates a backend rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        ResolveError::BackendRejected {
            reason: reason.into(),
        }
    }
}

/// Main error type for all PRESIGN operations.
#[derive(Debug, Error)]
pub enum PresignError {
    // ═══════════════════════════════════════════════════════════════════════════
    // RESOLUTION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Batch resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Subscribing to an event source failed.
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Snapshot file is unreadable or from an unknown format.
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    /// Snapshot format version mismatch.
    #[error("Snapshot version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build writes
        expected: u8,
        /// Version found on disk
        actual: u8,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResolveError::rejected("bucket is locked");
        assert!(err.to_string().contains("bucket is locked"));

        let err = PresignError::VersionMismatch {
            expected: 1,
            actual: 7,
        };
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_resolve_error_is_transparent() {
        let err = PresignError::from(ResolveError::transport("connection refused"));
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("invalid");
        let presign_result: Result<serde_json::Value> =
            json_result.map_err(PresignError::from);
        assert!(matches!(presign_result, Err(PresignError::JsonError(_))));
    }
}
