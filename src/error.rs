//! Error types for splitjob
//!
//! This module provides the error taxonomy for the library:
//! - Remote failures (network, HTTP status, unknown job)
//! - Payload validation failures, with the offending field path
//! - Local errors (configuration, shutdown in progress)
//!
//! Cancellation is not an error: a cancelled job resolves with
//! [`JobOutcome::Cancelled`](crate::types::JobOutcome::Cancelled), never an error.

use thiserror::Error;

/// Result type alias for splitjob operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for splitjob
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.interval")
        key: Option<String>,
    },

    /// Transport-level failure talking to the split service
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The split service answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// The split service has no record of the job (e.g. lost across a restart)
    #[error("job unknown to split service: {0}")]
    JobUnknown(String),

    /// Status payload failed schema validation
    #[error("invalid status payload: {0}")]
    StatusValidation(ValidationError),

    /// Page details failed schema validation
    #[error("invalid details for page {page}: {source}")]
    DetailsValidation {
        /// Page whose details were rejected
        page: u32,
        /// What was wrong with them
        source: ValidationError,
    },

    /// The identity collaborator could not supply a bearer credential
    #[error("credential unavailable: {0}")]
    Credential(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed service URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A job id or artifact name that cannot be used as a URL path segment
    /// (empty, `.` or `..`)
    #[error("invalid path segment: {0:?}")]
    InvalidPathSegment(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,
}

impl Error {
    /// True when the service reported that it has no state for the job.
    ///
    /// The poll loop answers this with a start resubmission instead of
    /// treating it as an ordinary transient failure.
    pub fn is_job_unknown(&self) -> bool {
        matches!(self, Error::JobUnknown(_))
    }

    /// True for failures the poll loop absorbs and retries on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::StatusValidation(_) | Error::Serialization(_) => true,
            Error::Credential(_) => true,
            // 4xx other than 404 won't fix themselves, but the loop still keeps going
            Error::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A payload failed schema validation
///
/// `path` is a dotted field path into the payload, such as
/// `pages.page_3.status` or `fields.total`. An empty path means the root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", display_path(.path))]
pub struct ValidationError {
    /// Dotted path of the offending field
    pub path: String,
    /// What was wrong with it
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `path`
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}
