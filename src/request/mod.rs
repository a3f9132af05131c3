//! A single E-utilities HTTP call and its outcome

mod parameters;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::EutilsError;

pub use parameters::{HistorySession, Parameters};

/// Process-wide, monotonically increasing request number
pub type RequestId = u64;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// E-utility endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Eutil {
    ESearch,
    EPost,
    ELink,
    EFetch,
}

impl Eutil {
    /// Path relative to the E-utilities base URL
    pub fn path(&self) -> &'static str {
        match self {
            Eutil::ESearch => "esearch.fcgi",
            Eutil::EPost => "epost.fcgi",
            Eutil::ELink => "elink.fcgi",
            Eutil::EFetch => "efetch.fcgi",
        }
    }
}

impl fmt::Display for Eutil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Eutil::ESearch => "esearch",
            Eutil::EPost => "epost",
            Eutil::ELink => "elink",
            Eutil::EFetch => "efetch",
        };
        f.write_str(name)
    }
}

/// HTTP method used for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Method {
    /// Parameters in the query string
    Get,
    /// Parameters in a form body, for long id lists
    Post,
}

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl RequestStatus {
    /// Whether the request has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Succeeded | RequestStatus::Failed)
    }
}

/// Why a request ended up failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Transient failures on every attempt until the retry budget ran out
    Exhausted,
    /// Rejected by the service or the configuration, not retried
    Permanent,
    /// The response arrived but the analyzer could not use it
    Interpretation,
    /// Cancelled before dispatch
    Cancelled,
    /// The worker running the request stopped without reporting back
    Aborted,
}

/// Terminal failure recorded on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFailure {
    pub kind: FailureKind,
    /// HTTP status of the last attempt, if one was received
    pub status: Option<u16>,
    pub message: String,
}

impl RequestFailure {
    /// Classify the error that ended the last attempt
    pub fn from_error(err: &EutilsError) -> Self {
        use crate::retry::RetryableError;

        let kind = match err {
            EutilsError::Cancelled => FailureKind::Cancelled,
            err if err.is_retryable() => FailureKind::Exhausted,
            _ => FailureKind::Permanent,
        };
        Self {
            kind,
            status: err.status(),
            message: err.to_string(),
        }
    }

    /// Failure raised while interpreting a successful response
    pub fn interpretation(err: &EutilsError) -> Self {
        Self {
            kind: FailureKind::Interpretation,
            status: None,
            message: err.to_string(),
        }
    }

    pub(crate) fn aborted() -> Self {
        Self {
            kind: FailureKind::Aborted,
            status: None,
            message: "request worker stopped before reporting an outcome".to_string(),
        }
    }
}

/// One concrete network call derived from a query
///
/// The description (endpoint, method, parameters, owning query) is fixed at
/// creation. Only the outcome fields change, and only while a pool worker owns
/// the request.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    id: RequestId,
    query_id: String,
    eutil: Eutil,
    method: Method,
    parameters: Parameters,
    attempts: u32,
    status: RequestStatus,
    failure: Option<RequestFailure>,
    #[serde(skip)]
    response: Option<String>,
    response_len: Option<usize>,
    duration: Option<Duration>,
}

impl Request {
    /// Create a pending request owned by `query_id`
    pub fn new<Q: Into<String>>(
        query_id: Q,
        eutil: Eutil,
        method: Method,
        parameters: Parameters,
    ) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            query_id: query_id.into(),
            eutil,
            method,
            parameters,
            attempts: 0,
            status: RequestStatus::Pending,
            failure: None,
            response: None,
            response_len: None,
            duration: None,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn eutil(&self) -> Eutil {
        self.eutil
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn failure(&self) -> Option<&RequestFailure> {
        self.failure.as_ref()
    }

    /// Raw response payload, until the pool releases it after interpretation
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Size of the response payload in bytes, kept after release
    pub fn response_len(&self) -> Option<usize> {
        self.response_len
    }

    /// Wall time spent from first dispatch to terminal state
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Offset of the first item this request covers
    pub fn retstart(&self) -> usize {
        self.parameters.retstart().ok().flatten().unwrap_or(0)
    }

    /// JSON snapshot of the request, for diagnostics
    pub fn dump(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub(crate) fn mark_in_flight(&mut self) {
        self.status = RequestStatus::InFlight;
    }

    pub(crate) fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    pub(crate) fn mark_succeeded(&mut self, payload: String) {
        self.response_len = Some(payload.len());
        self.response = Some(payload);
        self.failure = None;
        self.status = RequestStatus::Succeeded;
    }

    pub(crate) fn mark_failed(&mut self, failure: RequestFailure) {
        self.failure = Some(failure);
        self.status = RequestStatus::Failed;
    }

    pub(crate) fn release_response(&mut self) {
        self.response = None;
    }
}
