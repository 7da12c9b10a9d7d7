//! Error types for media-dl
//!
//! The error surface mirrors the failure taxonomy of the orchestration core:
//! engine failures inside an attempt are transient and retried by the
//! dispatcher, and only the final attempt's failure ever reaches a task's
//! `error_message`. Everything else here is adapter plumbing (configuration
//! files, the sqlite history sink).

use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "destination_dir")
        key: Option<String>,
    },

    /// Extraction/download engine error
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// SQLx database error (history sink adapter)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by the extraction/download engine collaborator
///
/// A `Transfer` failure inside an attempt is treated as transient: the
/// dispatcher retries it with backoff until the budget runs out. The other
/// variants surface engine plumbing problems; format-discovery failures are
/// logged and treated as an empty listing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transfer itself failed (network error, site error, engine abort)
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Format discovery failed (best-effort, callers treat as empty)
    #[error("format discovery failed: {0}")]
    FormatDiscovery(String),

    /// The engine process could not be started
    #[error("failed to launch engine process: {0}")]
    Launch(String),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_converts_into_error() {
        let err: Error = EngineError::Transfer("connection reset".to_string()).into();
        assert!(matches!(err, Error::Engine(EngineError::Transfer(_))));
        assert_eq!(err.to_string(), "engine error: transfer failed: connection reset");
    }

    #[test]
    fn config_error_display_includes_message() {
        let err = Error::Config {
            message: "max_concurrent_downloads must be positive".to_string(),
            key: Some("max_concurrent_downloads".to_string()),
        };
        assert!(err.to_string().contains("must be positive"));
    }
}
