//! Query types for the E-utilities
//!
//! Each E-utility comes as a [`RequestBuilder`](crate::RequestBuilder) that
//! plans requests, an [`Analyzer`](crate::Analyzer) that merges responses, and
//! the result type the analyzer accumulates.
//!
//! | Utility | Builder | Paginated |
//! | --- | --- | --- |
//! | esearch | [`Esearch`] | yes, 10 000 UIDs per request |
//! | epost | [`Epost`] | no |
//! | elink | [`Elink`] | no |
//! | efetch | [`Efetch`] | yes, 500 records per request |

mod efetch;
mod elink;
mod epost;
mod esearch;
pub(crate) mod responses;

pub use efetch::{EFETCH_MAX_ITEMS, Efetch, EfetchAnalyzer, EfetchResult};
pub use elink::{
    ELINK_POST_THRESHOLD, Elink, ElinkAnalyzer, ElinkResult, IdCheck, IdUrls, Link, LinkHistory,
    LinkInfo, LinkList, LinkOut, Linkset,
};
pub use epost::{Epost, EpostAnalyzer, EpostResult};
pub use esearch::{ESEARCH_MAX_ITEMS, Esearch, EsearchAnalyzer, EsearchResult};

use crate::error::{EutilsError, Result};
use crate::request::{Eutil, HistorySession, Parameters};

/// Value of a parameter the utility cannot run without
pub(crate) fn require<'a>(parameters: &'a Parameters, key: &str, eutil: Eutil) -> Result<&'a str> {
    parameters
        .get(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| EutilsError::ConfigurationError(format!("{eutil} requires `{key}`")))
}

/// Turn the service's in-band `ERROR` field into an error
pub(crate) fn check_service_error(error: Option<&str>, eutil: Eutil) -> Result<()> {
    match error.map(str::trim).filter(|e| !e.is_empty()) {
        Some(message) => Err(EutilsError::InvalidResponse(format!(
            "{eutil} error: {message}"
        ))),
        None => Ok(()),
    }
}

/// Parse a count the service reports as a string
pub(crate) fn parse_count(raw: Option<&str>, eutil: Eutil) -> Result<usize> {
    let raw = raw.ok_or_else(|| {
        EutilsError::InvalidResponse(format!("{eutil} response carries no count"))
    })?;
    raw.trim()
        .parse()
        .map_err(|_| EutilsError::InvalidResponse(format!("{eutil} count is not a number: {raw}")))
}

/// Session pair as a WebEnv / query_key pair when both halves are present
pub(crate) fn session_from(webenv: Option<&str>, query_key: Option<&str>) -> Option<HistorySession> {
    match (webenv, query_key) {
        (Some(webenv), Some(query_key)) => Some(HistorySession::new(webenv, query_key)),
        _ => None,
    }
}

/// Parameters that continue from a history session in a later query
pub(crate) fn follow_up(db: Option<&str>, session: &HistorySession) -> Parameters {
    let mut parameters = Parameters::new();
    if let Some(db) = db {
        parameters.set("db", db);
    }
    parameters.set("WebEnv", &session.webenv);
    parameters.set("query_key", &session.query_key);
    parameters
}
