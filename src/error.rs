use std::result;

use crate::retry::RetryableError;
use thiserror::Error;

/// Error types for E-utilities client operations
#[derive(Error, Debug)]
pub enum EutilsError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML parsing failed
    #[error("XML parsing failed: {0}")]
    XmlError(String),

    /// Missing identity fields or malformed parameter combinations.
    /// Raised before any network activity and never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Server-side or throttling failure reported with an HTTP status (5xx, 429)
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Request rejected by the remote service (client error status other than 429)
    #[error("Request rejected {status}: {message}")]
    PermanentRequestError { status: u16, message: String },

    /// API rate limit exceeded
    #[error("API rate limit exceeded")]
    RateLimitExceeded,

    /// Submission to a request pool that has already been drained
    #[error("Request pool is closed: submit called after drain")]
    PoolClosed,

    /// The operation was cancelled before it could be dispatched
    #[error("Operation cancelled")]
    Cancelled,

    /// The response could not be interpreted, including in-band `ERROR` fields
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A query did not complete successfully
    #[error("Query {query_id} finished {status}: {failed} of {total} requests failed")]
    QueryFailed {
        query_id: String,
        status: String,
        failed: usize,
        total: usize,
    },
}

pub type Result<T> = result::Result<T, EutilsError>;

impl From<quick_xml::Error> for EutilsError {
    fn from(err: quick_xml::Error) -> Self {
        EutilsError::XmlError(err.to_string())
    }
}

impl From<quick_xml::DeError> for EutilsError {
    fn from(err: quick_xml::DeError) -> Self {
        EutilsError::XmlError(err.to_string())
    }
}

impl RetryableError for EutilsError {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors are typically transient
            EutilsError::RequestError(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }

                if let Some(status) = err.status() {
                    return status.is_server_error() || status.as_u16() == 429;
                }

                // DNS and other network errors
                !err.is_builder() && !err.is_redirect() && !err.is_decode()
            }

            EutilsError::RateLimitExceeded => true,

            EutilsError::ApiError { status, .. } => {
                (*status >= 500 && *status < 600) || *status == 429
            }

            EutilsError::JsonError(_)
            | EutilsError::XmlError(_)
            | EutilsError::ConfigurationError(_)
            | EutilsError::PermanentRequestError { .. }
            | EutilsError::PoolClosed
            | EutilsError::Cancelled
            | EutilsError::InvalidResponse(_)
            | EutilsError::QueryFailed { .. } => false,
        }
    }

    fn retry_reason(&self) -> &str {
        if self.is_retryable() {
            match self {
                EutilsError::RequestError(err) if err.is_timeout() => "Request timeout",
                EutilsError::RequestError(err) if err.is_connect() => "Connection error",
                EutilsError::RequestError(_) => "Network error",
                EutilsError::RateLimitExceeded => "Rate limit exceeded",
                EutilsError::ApiError { status, .. } => match status {
                    429 => "Rate limit exceeded",
                    _ => "Server error",
                },
                _ => "Transient error",
            }
        } else {
            match self {
                EutilsError::JsonError(_) => "Invalid JSON response",
                EutilsError::XmlError(_) => "Invalid XML response",
                EutilsError::ConfigurationError(_) => "Invalid configuration",
                EutilsError::PermanentRequestError { .. } => "Request rejected by server",
                EutilsError::PoolClosed => "Pool closed",
                EutilsError::Cancelled => "Cancelled",
                EutilsError::InvalidResponse(_) => "Invalid response",
                _ => "Non-transient error",
            }
        }
    }
}

impl EutilsError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            EutilsError::RequestError(err) => err.status().map(|s| s.as_u16()),
            EutilsError::ApiError { status, .. }
            | EutilsError::PermanentRequestError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
