//! ESearch: UIDs matching a search term

use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use super::responses::ESearchResponse;
use super::{check_service_error, follow_up, parse_count, require, session_from};
use crate::analyzer::{Analyzer, EutilsResult};
use crate::error::{EutilsError, Result};
use crate::query::{Discovery, Page, RequestBuilder};
use crate::request::{Eutil, HistorySession, Parameters, Request};

/// Most UIDs a single esearch response returns
pub const ESEARCH_MAX_ITEMS: usize = 10_000;

/// Request builder for esearch
///
/// Open ranges are paged after a count-only discovery request. With
/// `usehistory`, the discovery request creates the history session and the
/// pages run without it, so no extra query keys are minted.
#[derive(Debug, Clone)]
pub struct Esearch {
    max_items: usize,
}

impl Default for Esearch {
    fn default() -> Self {
        Self {
            max_items: ESEARCH_MAX_ITEMS,
        }
    }
}

impl Esearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the number of UIDs requested per page
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.clamp(1, ESEARCH_MAX_ITEMS);
        self
    }

    fn wire(parameters: &Parameters) -> Parameters {
        let mut wire = parameters.to_request_parameters();
        wire.set("retmode", "json");
        wire
    }

    fn count_only(parameters: &Parameters) -> bool {
        parameters.get("rettype") == Some("count")
    }
}

impl RequestBuilder for Esearch {
    fn eutil(&self) -> Eutil {
        Eutil::ESearch
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        require(parameters, "db", Eutil::ESearch)?;
        let session = parameters.history_session()?;
        if session.is_none() && !parameters.contains("term") {
            return Err(EutilsError::ConfigurationError(
                "esearch requires `term` or a WebEnv / query_key pair".to_string(),
            ));
        }
        Ok(())
    }

    fn max_items_per_request(&self) -> Option<usize> {
        Some(self.max_items)
    }

    fn discovery_request(&self, parameters: &Parameters) -> Result<Option<(Eutil, Parameters)>> {
        let mut wire = Self::wire(parameters);
        wire.set("retmax", 0);
        wire.remove("retstart");
        Ok(Some((Eutil::ESearch, wire)))
    }

    fn parse_discovery(&self, payload: &str) -> Result<Discovery> {
        let response: ESearchResponse = serde_json::from_str(payload)?;
        let data = response.esearchresult;
        check_service_error(data.error.as_deref(), Eutil::ESearch)?;

        let discovery = Discovery::new(parse_count(data.count.as_deref(), Eutil::ESearch)?);
        Ok(
            match session_from(data.webenv.as_deref(), data.query_key.as_deref()) {
                Some(session) => discovery.with_session(session),
                None => discovery,
            },
        )
    }

    fn build(
        &self,
        parameters: &Parameters,
        pages: Option<&[Page]>,
        discovery: Option<&Discovery>,
    ) -> Result<Vec<Parameters>> {
        let mut base = Self::wire(parameters);

        let Some(pages) = pages else {
            return Ok(vec![base]);
        };
        if discovery.is_some() && Self::count_only(parameters) {
            // The discovery response already carried the count
            return Ok(Vec::new());
        }
        if discovery.is_some_and(|d| d.session.is_some()) {
            base.remove("usehistory");
        }

        Ok(pages
            .iter()
            .map(|page| {
                base.clone()
                    .with("retstart", page.retstart)
                    .with("retmax", page.retmax)
            })
            .collect())
    }
}

/// Accumulated esearch result
#[derive(Debug, Clone, Default)]
pub struct EsearchResult {
    db: Option<String>,
    count: usize,
    webenv: Option<String>,
    query_key: Option<String>,
    query_translation: Option<String>,
    /// UIDs per page, keyed by offset
    pages: BTreeMap<usize, Vec<String>>,
}

impl EsearchResult {
    /// Total number of matching UIDs reported by the service
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fetched UIDs in result order
    pub fn uids(&self) -> Vec<&str> {
        self.pages.values().flatten().map(String::as_str).collect()
    }

    pub fn db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    /// How the service translated the search term
    pub fn query_translation(&self) -> Option<&str> {
        self.query_translation.as_deref()
    }

    /// History session holding the full result set, if one was requested
    pub fn history_session(&self) -> Option<HistorySession> {
        session_from(self.webenv.as_deref(), self.query_key.as_deref())
    }

    /// Offsets `[start, end)` of the UIDs this search retrieved
    pub fn retrieved_range(&self) -> Option<(usize, usize)> {
        let start = *self.pages.keys().next()?;
        let end = self
            .pages
            .iter()
            .map(|(offset, uids)| offset + uids.len())
            .max()
            .unwrap_or(start);
        Some((start, end))
    }

    /// Parameters for a later query over the UIDs this search retrieved
    ///
    /// When the search covered only part of the session (`retstart`,
    /// `retmax` or `limit`), the slice is carried as `retstart` and `limit`.
    pub fn follow_up(&self) -> Option<Parameters> {
        let mut parameters = self.session_follow_up()?;
        if let Some((start, end)) = self.retrieved_range() {
            if start > 0 || end < self.count {
                if start > 0 {
                    parameters.set("retstart", start);
                }
                parameters.set("limit", end - start);
            }
        }
        Some(parameters)
    }

    /// Parameters for a later query over the whole history session
    pub fn session_follow_up(&self) -> Option<Parameters> {
        self.history_session()
            .map(|session| follow_up(self.db(), &session))
    }
}

impl EutilsResult for EsearchResult {
    fn size(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    fn dump(&self) -> serde_json::Value {
        json!({
            "db": self.db,
            "count": self.count,
            "uids": self.uids(),
            "webenv": self.webenv,
            "query_key": self.query_key,
            "query_translation": self.query_translation,
        })
    }
}

/// Analyzer collecting esearch UIDs in offset order
#[derive(Debug, Default)]
pub struct EsearchAnalyzer {
    result: EsearchResult,
    errors: usize,
}

impl EsearchAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&mut self, request: &Request, payload: &str) -> Result<()> {
        let response: ESearchResponse = serde_json::from_str(payload)?;
        let data = response.esearchresult;
        check_service_error(data.error.as_deref(), Eutil::ESearch)?;

        if self.result.db.is_none() {
            self.result.db = request.parameters().db().map(str::to_string);
        }
        if let Some(count) = data.count.as_deref() {
            self.result.count = parse_count(Some(count), Eutil::ESearch)?;
        }
        // A session from discovery wins over anything a page reports
        if self.result.webenv.is_none() && self.result.query_key.is_none() {
            if let Some(session) = session_from(data.webenv.as_deref(), data.query_key.as_deref()) {
                self.result.webenv = Some(session.webenv);
                self.result.query_key = Some(session.query_key);
            }
        }
        if data.querytranslation.is_some() {
            self.result.query_translation = data.querytranslation;
        }

        debug!(
            retstart = request.retstart(),
            uids = data.idlist.len(),
            "Merged esearch page"
        );
        self.result.pages.insert(request.retstart(), data.idlist);
        Ok(())
    }
}

impl Analyzer for EsearchAnalyzer {
    type Output = EsearchResult;

    fn interpret(&mut self, request: &Request, payload: &str) -> Result<()> {
        let parsed = self.parse(request, payload);
        if parsed.is_err() {
            self.errors += 1;
        }
        parsed
    }

    fn discovered(&mut self, discovery: &Discovery) {
        self.result.count = discovery.total;
        if let Some(session) = &discovery.session {
            self.result.webenv = Some(session.webenv.clone());
            self.result.query_key = Some(session.query_key.clone());
        }
    }

    fn is_success(&self) -> bool {
        self.errors == 0
    }

    fn result(&self) -> &EsearchResult {
        &self.result
    }

    fn into_result(self) -> EsearchResult {
        self.result
    }
}
