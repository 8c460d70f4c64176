//! Error types and handling for pagesync-core operations.
//!
//! Errors are grouped by the collaborator that produced them (document API,
//! object storage, local filesystem, configuration) and carry a coarse
//! category string for logging. Transient network failures are the only
//! errors the retry wrapper is expected to mask; everything else is surfaced
//! to the caller.

use thiserror::Error;

/// The main error type for pagesync-core operations.
///
/// All public functions in pagesync-core return `Result<T, Error>`. The
/// variants map onto the failure taxonomy of the sync pipeline: network and
/// API errors are retried (without discrimination, by design of the retry
/// policy), storage upload errors are logged and swallowed by the cache
/// writer, and local I/O errors propagate and abort the run.
#[derive(Error, Debug)]
pub enum Error {
    /// Local filesystem operation failed.
    ///
    /// Raised by the `tmp/` write-through cache. These errors are outside the
    /// retry boundary and fatal to the run.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP-level failure talking to the document API or object storage.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The document API returned a non-success status.
    #[error("Document API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Error body or status text from the response.
        message: String,
    },

    /// Object storage returned a non-success status or an unparseable
    /// listing response.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A retried operation spent its whole budget and the pipeline cannot
    /// continue without its result (page listing is the only such call).
    #[error("retry budget exhausted while {operation}")]
    Exhausted {
        /// Human-readable description of the failed operation.
        operation: String,
    },

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cached object or API record did not have the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry.
    ///
    /// The retry policy itself retries every error identically; this hint is
    /// used only for log wording, so an operator can tell a flaky network
    /// apart from a misconfigured credential.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            // 429 and 5xx are the transient document API responses
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Coarse category identifier for structured logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::Exhausted { .. } => "retry",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
