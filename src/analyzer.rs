//! Result interpretation
//!
//! A request pool hands every successful response to an [`Analyzer`], which
//! merges it into one accumulated result for the whole query. Responses arrive
//! in completion order; analyzers that care about order use the offset
//! carried in each request's parameters.

use std::fmt::Debug;

use crate::error::Result;
use crate::query::Discovery;
use crate::request::Request;

/// Decoded outcome of a query
pub trait EutilsResult: Debug + Send {
    /// Number of items in the result
    fn size(&self) -> usize;

    /// Whether the result holds no items
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Structured representation for logging and inspection
    fn dump(&self) -> serde_json::Value;
}

/// Per-query-type response interpreter
pub trait Analyzer: Send {
    /// Result type accumulated by this analyzer
    type Output: EutilsResult;

    /// Merge the response of one successful request
    ///
    /// Returning an error marks the request failed without retrying it.
    fn interpret(&mut self, request: &Request, payload: &str) -> Result<()>;

    /// Called once with the outcome of the discovery request, before any
    /// follow-up request is interpreted
    fn discovered(&mut self, _discovery: &Discovery) {}

    /// Whether every response seen so far could be interpreted
    fn is_success(&self) -> bool;

    /// Whether the accumulated result is empty
    fn is_empty(&self) -> bool {
        self.result().is_empty()
    }

    /// Accumulated result
    fn result(&self) -> &Self::Output;

    /// Take the accumulated result
    fn into_result(self) -> Self::Output;
}
