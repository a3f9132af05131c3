//! EFetch: full records, as opaque text in the requested format

use std::collections::BTreeMap;

use serde_json::json;

use super::esearch::Esearch;
use super::require;
use crate::analyzer::{Analyzer, EutilsResult};
use crate::error::{EutilsError, Result};
use crate::query::{Discovery, Page, RequestBuilder};
use crate::request::{Eutil, Method, Parameters, Request, RequestId};

/// Most records a single efetch request asks for
pub const EFETCH_MAX_ITEMS: usize = 500;

/// Id lists longer than this are sent as a POST body
const POST_THRESHOLD: usize = 200;

/// Request builder for efetch
///
/// An explicit `id` list is split into batches locally. A history session is
/// paged with `retstart` / `retmax` after an esearch count on `#query_key`.
#[derive(Debug, Clone)]
pub struct Efetch {
    max_items: usize,
}

impl Default for Efetch {
    fn default() -> Self {
        Self {
            max_items: EFETCH_MAX_ITEMS,
        }
    }
}

impl Efetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the number of records requested per page
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    fn uses_history(parameters: &Parameters) -> bool {
        parameters.webenv().is_some() && parameters.query_key().is_some()
    }
}

impl RequestBuilder for Efetch {
    fn eutil(&self) -> Eutil {
        Eutil::EFetch
    }

    fn method(&self, request: &Parameters) -> Method {
        if request.ids().len() > POST_THRESHOLD {
            Method::Post
        } else {
            Method::Get
        }
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        require(parameters, "db", Eutil::EFetch)?;
        let session = parameters.history_session()?;
        if session.is_none() && parameters.ids().is_empty() {
            return Err(EutilsError::ConfigurationError(
                "efetch requires `id` or a WebEnv / query_key pair".to_string(),
            ));
        }
        Ok(())
    }

    fn max_items_per_request(&self) -> Option<usize> {
        Some(self.max_items)
    }

    fn counts_exact_range(&self, parameters: &Parameters) -> bool {
        Self::uses_history(parameters)
    }

    fn known_total(&self, parameters: &Parameters) -> Result<Option<usize>> {
        if Self::uses_history(parameters) {
            return Ok(None);
        }
        Ok(Some(parameters.ids().len()))
    }

    fn discovery_request(&self, parameters: &Parameters) -> Result<Option<(Eutil, Parameters)>> {
        let Some(session) = parameters.history_session()? else {
            return Ok(None);
        };
        let db = require(parameters, "db", Eutil::EFetch)?;

        let wire = Parameters::new()
            .with("db", db)
            .with("term", format!("#{}", session.query_key))
            .with("WebEnv", &session.webenv)
            .with("query_key", &session.query_key)
            .with("usehistory", "y")
            .with("retmax", 0)
            .with("retmode", "json");
        Ok(Some((Eutil::ESearch, wire)))
    }

    fn parse_discovery(&self, payload: &str) -> Result<Discovery> {
        // Only the count matters, the caller's session keeps driving the pages
        let found = Esearch::new().parse_discovery(payload)?;
        Ok(Discovery::new(found.total))
    }

    fn build(
        &self,
        parameters: &Parameters,
        pages: Option<&[Page]>,
        _discovery: Option<&Discovery>,
    ) -> Result<Vec<Parameters>> {
        let base = parameters.to_request_parameters();
        let Some(pages) = pages else {
            return Ok(vec![base]);
        };

        if Self::uses_history(parameters) {
            return Ok(pages
                .iter()
                .map(|page| {
                    base.clone()
                        .with("retstart", page.retstart)
                        .with("retmax", page.retmax)
                })
                .collect());
        }

        let ids = parameters.ids();
        let mut batches = Vec::with_capacity(pages.len());
        for page in pages {
            let end = page.end().min(ids.len());
            let Some(batch) = ids.get(page.retstart..end).filter(|b| !b.is_empty()) else {
                continue;
            };
            let mut wire = base.clone().with("id", batch.join(","));
            wire.remove("retstart");
            wire.remove("retmax");
            batches.push(wire);
        }
        Ok(batches)
    }
}

#[derive(Debug, Clone)]
struct FetchedPage {
    items: usize,
    payload: String,
}

/// Accumulated efetch result
///
/// Pages are kept in planning order; request ids follow that order. A page
/// counts the ids it asked for, or its `retmax` for history input, which is
/// clamped to the session's size before sending. Blank payloads count as empty.
#[derive(Debug, Clone, Default)]
pub struct EfetchResult {
    db: Option<String>,
    retmode: Option<String>,
    rettype: Option<String>,
    pages: BTreeMap<RequestId, FetchedPage>,
}

impl EfetchResult {
    pub fn db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    pub fn retmode(&self) -> Option<&str> {
        self.retmode.as_deref()
    }

    pub fn rettype(&self) -> Option<&str> {
        self.rettype.as_deref()
    }

    /// Raw payloads in order
    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.pages.values().map(|page| page.payload.as_str())
    }

    /// Number of pages fetched
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All payloads concatenated in order
    pub fn text(&self) -> String {
        self.pages().collect()
    }
}

impl EutilsResult for EfetchResult {
    fn size(&self) -> usize {
        self.pages.values().map(|page| page.items).sum()
    }

    fn dump(&self) -> serde_json::Value {
        json!({
            "db": self.db,
            "retmode": self.retmode,
            "rettype": self.rettype,
            "pages": self.pages.len(),
            "items": self.size(),
            "bytes": self.pages.values().map(|page| page.payload.len()).sum::<usize>(),
        })
    }
}

/// Analyzer keeping efetch payloads as text
#[derive(Debug, Default)]
pub struct EfetchAnalyzer {
    result: EfetchResult,
}

impl EfetchAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for EfetchAnalyzer {
    type Output = EfetchResult;

    fn interpret(&mut self, request: &Request, payload: &str) -> Result<()> {
        let parameters = request.parameters();
        if self.result.db.is_none() {
            self.result.db = parameters.db().map(str::to_string);
            self.result.retmode = parameters.get("retmode").map(str::to_string);
            self.result.rettype = parameters.get("rettype").map(str::to_string);
        }

        let ids = parameters.ids().len();
        let items = if payload.trim().is_empty() {
            0
        } else if ids > 0 {
            ids
        } else {
            parameters.retmax()?.unwrap_or(0)
        };

        self.result.pages.insert(
            request.id(),
            FetchedPage {
                items,
                payload: payload.to_string(),
            },
        );
        Ok(())
    }

    fn is_success(&self) -> bool {
        true
    }

    fn result(&self) -> &EfetchResult {
        &self.result
    }

    fn into_result(self) -> EfetchResult {
        self.result
    }
}
