//! EPost: upload UIDs to the history server

use serde_json::json;
use tracing::info;

use super::responses::{EPostResponse, EPostXml};
use super::{check_service_error, follow_up, require, session_from};
use crate::analyzer::{Analyzer, EutilsResult};
use crate::error::{EutilsError, Result};
use crate::query::{Discovery, Page, RequestBuilder};
use crate::request::{Eutil, HistorySession, Method, Parameters, Request};

/// Request builder for epost
///
/// Always a single POST. Passing a WebEnv appends the UIDs to that session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Epost;

impl RequestBuilder for Epost {
    fn eutil(&self) -> Eutil {
        Eutil::EPost
    }

    fn method(&self, _request: &Parameters) -> Method {
        Method::Post
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        require(parameters, "db", Eutil::EPost)?;
        if parameters.ids().is_empty() {
            return Err(EutilsError::ConfigurationError(
                "epost requires a non-empty `id` list".to_string(),
            ));
        }
        if parameters.query_key().is_some() && parameters.webenv().is_none() {
            return Err(EutilsError::ConfigurationError(
                "query_key given without WebEnv".to_string(),
            ));
        }
        Ok(())
    }

    fn build(
        &self,
        parameters: &Parameters,
        _pages: Option<&[Page]>,
        _discovery: Option<&Discovery>,
    ) -> Result<Vec<Parameters>> {
        Ok(vec![parameters.to_request_parameters()])
    }
}

/// History session created by an epost
#[derive(Debug, Clone, Default)]
pub struct EpostResult {
    pub db: Option<String>,
    pub webenv: Option<String>,
    pub query_key: Option<String>,
    /// UIDs the service accepted
    pub posted: usize,
    /// UIDs the service reported as invalid
    pub invalid_ids: Vec<String>,
}

impl EpostResult {
    pub fn history_session(&self) -> Option<HistorySession> {
        session_from(self.webenv.as_deref(), self.query_key.as_deref())
    }

    /// Parameters for a later query over the posted UIDs
    pub fn follow_up(&self) -> Option<Parameters> {
        self.history_session()
            .map(|session| follow_up(self.db.as_deref(), &session))
    }
}

impl EutilsResult for EpostResult {
    fn size(&self) -> usize {
        self.posted
    }

    fn dump(&self) -> serde_json::Value {
        json!({
            "db": self.db,
            "webenv": self.webenv,
            "query_key": self.query_key,
            "posted": self.posted,
            "invalid_ids": self.invalid_ids,
        })
    }
}

/// Analyzer for epost responses, JSON or XML
#[derive(Debug, Default)]
pub struct EpostAnalyzer {
    result: EpostResult,
    errors: usize,
}

impl EpostAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&mut self, request: &Request, payload: &str) -> Result<()> {
        let (webenv, query_key, invalid_ids) = if payload.trim_start().starts_with('{') {
            let response: EPostResponse = serde_json::from_str(payload)?;
            let data = response.epostresult;
            check_service_error(data.error.as_deref(), Eutil::EPost)?;
            (data.webenv, data.query_key, Vec::new())
        } else {
            let response: EPostXml = quick_xml::de::from_str(payload)?;
            check_service_error(response.error.as_deref(), Eutil::EPost)?;
            let invalid = response.invalid_ids.map(|list| list.ids).unwrap_or_default();
            (response.webenv, response.query_key, invalid)
        };

        let Some(session) = session_from(webenv.as_deref(), query_key.as_deref()) else {
            return Err(EutilsError::InvalidResponse(
                "epost response carries no WebEnv / QueryKey".to_string(),
            ));
        };

        let submitted = request.parameters().ids().len();
        self.result.db = request.parameters().db().map(str::to_string);
        self.result.posted = submitted.saturating_sub(invalid_ids.len());
        self.result.invalid_ids = invalid_ids;

        info!(
            posted = self.result.posted,
            query_key = %session.query_key,
            "EPost completed successfully"
        );
        self.result.webenv = Some(session.webenv);
        self.result.query_key = Some(session.query_key);
        Ok(())
    }
}

impl Analyzer for EpostAnalyzer {
    type Output = EpostResult;

    fn interpret(&mut self, request: &Request, payload: &str) -> Result<()> {
        let parsed = self.parse(request, payload);
        if parsed.is_err() {
            self.errors += 1;
        }
        parsed
    }

    fn is_success(&self) -> bool {
        self.errors == 0
    }

    fn is_empty(&self) -> bool {
        self.result.history_session().is_none()
    }

    fn result(&self) -> &EpostResult {
        &self.result
    }

    fn into_result(self) -> EpostResult {
        self.result
    }
}
