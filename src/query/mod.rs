//! Query orchestration
//!
//! A [`Query`] turns one logical caller request into concrete requests:
//!
//! 1. validate the configuration and the caller parameters
//! 2. for paginated query types without an exact range, learn the total item
//!    count (locally, or with a discovery request)
//! 3. plan pages under the per-request item cap, truncated by `limit`
//! 4. submit the built requests to a fresh [`RequestPool`] and drain it
//! 5. grade the failures with a [`RequestCheck`] into a [`QueryOutcome`]
//!
//! Configuration errors are returned before any network activity. Request
//! failures never abort the query; they are reported on the outcome.

mod pagination;

use std::fmt;

use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::analyzer::{Analyzer, EutilsResult};
use crate::config::ClientConfig;
use crate::error::{EutilsError, Result};
use crate::monitor::Monitor;
use crate::pool::RequestPool;
use crate::rate_limit::RateLimiter;
use crate::request::{Eutil, HistorySession, Method, Parameters, Request, RequestFailure};

pub use pagination::{ItemRange, Page, plan_pages};

/// Aggregate status of a finished query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Succeeded,
    Partial,
    Failed,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Succeeded => "succeeded",
            QueryStatus::Partial => "partial",
            QueryStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Lifecycle of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryState {
    Initialized,
    RequestsBuilt,
    Submitted,
    Draining,
    Complete(QueryStatus),
}

/// Policy turning request failures into a [`QueryStatus`]
///
/// With no failures a query always succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RequestCheck {
    /// Any failed request fails the query
    Strict,
    /// The query fails only when every request failed, otherwise it is partial
    #[default]
    Lenient,
    /// The query fails when the failed fraction exceeds `max_failed_fraction`,
    /// otherwise it is partial
    Threshold { max_failed_fraction: f64 },
}

impl RequestCheck {
    /// Status for `failed` failures out of `total` requests
    pub fn evaluate(&self, failed: usize, total: usize) -> QueryStatus {
        if failed == 0 || total == 0 {
            return QueryStatus::Succeeded;
        }
        let failed_all = failed >= total;
        let fails = match self {
            RequestCheck::Strict => true,
            RequestCheck::Lenient => failed_all,
            RequestCheck::Threshold {
                max_failed_fraction,
            } => failed_all || failed as f64 / total as f64 > *max_failed_fraction,
        };
        if fails {
            QueryStatus::Failed
        } else {
            QueryStatus::Partial
        }
    }
}

/// What a discovery step learned about the full result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    /// Total number of items available
    pub total: usize,
    /// History session created by the discovery request, if any
    pub session: Option<HistorySession>,
}

impl Discovery {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            session: None,
        }
    }

    pub fn with_session(mut self, session: HistorySession) -> Self {
        self.session = Some(session);
        self
    }
}

/// Per-query-type translation of caller parameters into requests
pub trait RequestBuilder: Send + Sync {
    /// Endpoint every built request targets
    fn eutil(&self) -> Eutil;

    /// HTTP method for one built parameter set
    fn method(&self, _request: &Parameters) -> Method {
        Method::Get
    }

    /// Reject malformed caller parameters with a configuration error
    fn validate(&self, parameters: &Parameters) -> Result<()>;

    /// Service cap on items per response; `None` for non-paginated types
    fn max_items_per_request(&self) -> Option<usize> {
        None
    }

    /// Whether an exact range must still be clamped to the discovered total
    ///
    /// Query types whose response size follows the requested `retmax` rather
    /// than the items returned need this to keep out-of-range pages unsent.
    fn counts_exact_range(&self, _parameters: &Parameters) -> bool {
        false
    }

    /// Total item count known without asking the service
    fn known_total(&self, _parameters: &Parameters) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Endpoint and wire parameters of a count-only request
    fn discovery_request(&self, _parameters: &Parameters) -> Result<Option<(Eutil, Parameters)>> {
        Ok(None)
    }

    /// Decode the discovery response
    fn parse_discovery(&self, payload: &str) -> Result<Discovery> {
        let _ = payload;
        Err(EutilsError::InvalidResponse(format!(
            "{} has no discovery step",
            self.eutil()
        )))
    }

    /// Wire parameters for every request of the query
    ///
    /// `pages` is `None` when the query is not paginated. An empty page list
    /// must produce no requests.
    fn build(
        &self,
        parameters: &Parameters,
        pages: Option<&[Page]>,
        discovery: Option<&Discovery>,
    ) -> Result<Vec<Parameters>>;
}

/// Shared resources a query runs with
#[derive(Debug, Clone)]
pub struct QueryContext {
    http: Client,
    config: ClientConfig,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
    monitor: Option<Monitor>,
}

impl QueryContext {
    pub fn new(http: Client, config: ClientConfig, rate_limiter: RateLimiter) -> Self {
        Self {
            http,
            config,
            rate_limiter,
            cancel: CancellationToken::new(),
            monitor: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn pool<A: Analyzer>(&self, analyzer: A) -> RequestPool<A> {
        RequestPool::new(
            self.http.clone(),
            &self.config,
            self.rate_limiter.clone(),
            analyzer,
        )
        .with_cancellation(self.cancel.clone())
    }
}

/// One logical query against the service
pub struct Query<B: RequestBuilder> {
    id: String,
    builder: B,
    parameters: Parameters,
    request_check: Option<RequestCheck>,
    state: QueryState,
}

impl<B: RequestBuilder> Query<B> {
    pub fn new(builder: B, parameters: Parameters) -> Self {
        Self {
            id: format!("{:016x}", rand::random::<u64>()),
            builder,
            parameters,
            request_check: None,
            state: QueryState::Initialized,
        }
    }

    /// Override the configured [`RequestCheck`] for this query
    pub fn with_request_check(mut self, request_check: RequestCheck) -> Self {
        self.request_check = Some(request_check);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Run the query to completion, feeding responses to `analyzer`
    ///
    /// Returns an error only for configuration problems detected before any
    /// request is sent. Everything else is reported on the outcome.
    #[instrument(skip_all, fields(query_id = %self.id, eutil = %self.builder.eutil()))]
    pub async fn run<A: Analyzer>(
        &mut self,
        ctx: &QueryContext,
        analyzer: A,
    ) -> Result<QueryOutcome<A>> {
        ctx.config.validate()?;
        self.builder.validate(&self.parameters)?;
        let range = match self.builder.max_items_per_request() {
            Some(cap) => Some(ItemRange::from_parameters(&self.parameters, cap)?),
            None => None,
        };

        if let Some(monitor) = &ctx.monitor {
            monitor.start(&self.id, self.builder.eutil());
        }

        let outcome = self.execute(ctx, analyzer, range).await;

        if let Ok(outcome) = &outcome {
            info!(
                status = %outcome.status,
                requests = outcome.request_count(),
                failed = outcome.failed.len(),
                "Query complete"
            );
            if outcome.has_failed_requests() {
                let dumps: Vec<serde_json::Value> =
                    outcome.failed.iter().map(Request::dump).collect();
                debug!(request_dumps = %serde_json::Value::Array(dumps), "Failed requests");
            }
        }
        if let Some(monitor) = &ctx.monitor {
            monitor.stop(&self.id);
        }

        outcome
    }

    async fn execute<A: Analyzer>(
        &mut self,
        ctx: &QueryContext,
        mut analyzer: A,
        range: Option<ItemRange>,
    ) -> Result<QueryOutcome<A>> {
        let mut discovery = None;

        let pages = match range {
            None => None,
            Some(range) => match range
                .exact_page()
                .filter(|_| !self.builder.counts_exact_range(&self.parameters))
            {
                Some(page) => Some(vec![page]),
                None => match self.discover(ctx).await? {
                    Discovered::Found(found) => {
                        debug!(total = found.total, "Discovered result size");
                        analyzer.discovered(&found);
                        let pages =
                            plan_pages(found.total, range.start, range.wanted, range.page_size);
                        discovery = Some(found);
                        Some(pages)
                    }
                    Discovered::Unavailable => None,
                    Discovered::Failed(failed) => {
                        warn!("Discovery request failed");
                        return Ok(self.finish(ctx, analyzer, Vec::new(), failed, None));
                    }
                },
            },
        };

        let parameter_sets = self
            .builder
            .build(&self.parameters, pages.as_deref(), discovery.as_ref())?;
        self.transition(ctx, QueryState::RequestsBuilt);

        let eutil = self.builder.eutil();
        let mut pool = ctx.pool(analyzer);
        for parameters in parameter_sets {
            let method = self.builder.method(&parameters);
            pool.submit(Request::new(self.id.as_str(), eutil, method, parameters))?;
        }
        if let Some(monitor) = &ctx.monitor {
            monitor.record_requests(&self.id, pool.submitted());
        }
        self.transition(ctx, QueryState::Submitted);

        self.transition(ctx, QueryState::Draining);
        pool.drain().await;

        let (analyzer, succeeded, failed) = pool.into_parts();
        Ok(self.finish(ctx, analyzer, succeeded, failed, discovery))
    }

    /// Learn the total item count, locally if possible
    async fn discover(&self, ctx: &QueryContext) -> Result<Discovered> {
        if let Some(total) = self.builder.known_total(&self.parameters)? {
            return Ok(Discovered::Found(Discovery::new(total)));
        }
        let Some((eutil, parameters)) = self.builder.discovery_request(&self.parameters)? else {
            return Ok(Discovered::Unavailable);
        };

        let mut pool = ctx.pool(CountResponse::default());
        pool.submit(Request::new(self.id.as_str(), eutil, Method::Get, parameters))?;
        pool.drain().await;

        let (response, mut succeeded, failed) = pool.into_parts();
        let Some(mut request) = succeeded.pop() else {
            return Ok(Discovered::Failed(failed));
        };

        match self.builder.parse_discovery(response.payload.as_deref().unwrap_or_default()) {
            Ok(found) => Ok(Discovered::Found(found)),
            Err(err) => {
                warn!(error = %err, "Discovery response could not be interpreted");
                request.mark_failed(RequestFailure::interpretation(&err));
                Ok(Discovered::Failed(vec![request]))
            }
        }
    }

    fn finish<A: Analyzer>(
        &mut self,
        ctx: &QueryContext,
        analyzer: A,
        succeeded: Vec<Request>,
        failed: Vec<Request>,
        discovery: Option<Discovery>,
    ) -> QueryOutcome<A> {
        let check = self.request_check.unwrap_or(ctx.config.request_check);
        let status = check.evaluate(failed.len(), succeeded.len() + failed.len());
        self.transition(ctx, QueryState::Complete(status));

        QueryOutcome {
            query_id: self.id.clone(),
            status,
            analyzer,
            succeeded,
            failed,
            discovery,
        }
    }

    fn transition(&mut self, ctx: &QueryContext, state: QueryState) {
        debug!(from = ?self.state, to = ?state, "Query state change");
        self.state = state;
        if let Some(monitor) = &ctx.monitor {
            monitor.transition(&self.id, state);
        }
    }
}

enum Discovered {
    Found(Discovery),
    Unavailable,
    Failed(Vec<Request>),
}

/// Keeps the raw payload of the single discovery request
#[derive(Debug, Default)]
struct CountResponse {
    payload: Option<String>,
}

impl EutilsResult for CountResponse {
    fn size(&self) -> usize {
        usize::from(self.payload.is_some())
    }

    fn dump(&self) -> serde_json::Value {
        serde_json::json!({ "payload": self.payload })
    }
}

impl Analyzer for CountResponse {
    type Output = CountResponse;

    fn interpret(&mut self, _request: &Request, payload: &str) -> Result<()> {
        self.payload = Some(payload.to_string());
        Ok(())
    }

    fn is_success(&self) -> bool {
        self.payload.is_some()
    }

    fn result(&self) -> &CountResponse {
        self
    }

    fn into_result(self) -> CountResponse {
        self
    }
}

/// Finished query: status, analyzer and request diagnostics
#[derive(Debug)]
pub struct QueryOutcome<A: Analyzer> {
    query_id: String,
    status: QueryStatus,
    analyzer: A,
    succeeded: Vec<Request>,
    failed: Vec<Request>,
    discovery: Option<Discovery>,
}

impl<A: Analyzer> QueryOutcome<A> {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Whether every request succeeded and the analyzer accepted every response
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Succeeded && self.analyzer.is_success()
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Accumulated result, unless the query failed
    ///
    /// A partial result is returned as well; check [`status`](Self::status).
    pub fn result(&self) -> Option<&A::Output> {
        match self.status {
            QueryStatus::Failed => None,
            _ => Some(self.analyzer.result()),
        }
    }

    /// The result of a fully successful query, or [`EutilsError::QueryFailed`]
    pub fn into_result(self) -> Result<A::Output> {
        if self.status == QueryStatus::Succeeded {
            return Ok(self.analyzer.into_result());
        }
        Err(EutilsError::QueryFailed {
            query_id: self.query_id,
            status: self.status.to_string(),
            failed: self.failed.len(),
            total: self.succeeded.len() + self.failed.len(),
        })
    }

    /// Requests that ended failed, discovery included
    pub fn failed_requests(&self) -> &[Request] {
        &self.failed
    }

    pub fn succeeded_requests(&self) -> &[Request] {
        &self.succeeded
    }

    pub fn has_failed_requests(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Number of follow-up requests that reached a terminal state
    pub fn request_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Discovery outcome, for paginated queries that needed one
    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// Analyzer and failed requests
    pub fn into_parts(self) -> (A, Vec<Request>) {
        (self.analyzer, self.failed)
    }
}
