//! Error types for reel-dl
//!
//! This module provides the error taxonomy for the library:
//! - Input errors (malformed URLs) that fail an item immediately
//! - Transient network errors and remote throttling, which the retry policy handles
//! - Resource errors surfaced by `start()` before any work begins
//! - Tool and persistence errors that degrade to warnings

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for reel-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for reel-dl
///
/// Each variant carries enough context to render a log line for the user.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// URL does not point at a supported post
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A request or a stream chunk took longer than allowed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Remote service answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// Remote service is throttling us (HTTP 429 or equivalent)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Metadata client failed to resolve a post or profile
    #[error("metadata client error: {0}")]
    Client(String),

    /// Post resolved but has nothing we are configured to download
    #[error("no downloadable media for {shortcode}: {reason}")]
    NoDownloadableMedia {
        /// Shortcode of the post
        shortcode: String,
        /// Why nothing could be downloaded
        reason: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state file could not be read or written
    #[error("persistence error for {path}: {reason}")]
    Persistence {
        /// File that failed
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Destination directory is missing and cannot be created, or is not writable
    #[error("destination {path} unavailable: {reason}")]
    DestinationUnavailable {
        /// The configured destination directory
        path: PathBuf,
        /// Why it cannot be used
        reason: String,
    },

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Connectivity probe failed before starting a run
    #[error("network unreachable: {0}")]
    Unreachable(String),

    /// `start()` was called with nothing queued
    #[error("queue is empty")]
    EmptyQueue,

    /// `start()` was called while a run is in progress
    #[error("a download run is already in progress")]
    AlreadyRunning,

    /// `retry_failed()` was called with an empty failed list
    #[error("no failed downloads to retry")]
    NothingToRetry,

    /// Operation was interrupted by a stop request
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Optional post-processing tool is not installed
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// External tool execution failed (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (no metadata client configured, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from the user's input rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidUrl(_))
    }

    /// Whether this error means the run was stopped rather than the item failing on its own
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages_carry_context() {
        let err = Error::HttpStatus {
            status: 404,
            url: "https://cdn.example.com/a.mp4".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://cdn.example.com/a.mp4");

        let err = Error::NoDownloadableMedia {
            shortcode: "Cxyz".to_string(),
            reason: "post is an image and image downloads are disabled".to_string(),
        };
        assert!(err.to_string().contains("Cxyz"));
        assert!(err.to_string().contains("image downloads are disabled"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Error::InvalidUrl("x".into()).is_input_error());
        assert!(!Error::EmptyQueue.is_input_error());
        assert!(Error::Cancelled("stop".into()).is_cancelled());
        assert!(!Error::Timeout("chunk".into()).is_cancelled());
    }
}
