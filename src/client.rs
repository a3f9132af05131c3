use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::analyzer::Analyzer;
use crate::config::{ClientConfig, RateLimiterScope};
use crate::error::Result;
use crate::eutils::{
    Efetch, EfetchAnalyzer, Elink, ElinkAnalyzer, Epost, EpostAnalyzer, Esearch, EsearchAnalyzer,
};
use crate::monitor::Monitor;
use crate::query::{Query, QueryContext, QueryOutcome, RequestBuilder};
use crate::rate_limit::RateLimiter;
use crate::request::Parameters;

/// Client for the NCBI E-utilities
///
/// Every query runs in its own request pool. With the default
/// [`RateLimiterScope::Shared`], all pools of a client (and of its clones) are
/// paced by one rate limiter.
#[derive(Clone)]
pub struct EutilsClient {
    http: Client,
    config: ClientConfig,
    rate_limiter: RateLimiter,
    monitor: Monitor,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl EutilsClient {
    /// Create a client with its own HTTP client
    ///
    /// # Example
    ///
    /// ```
    /// use eutils_client::{ClientConfig, EutilsClient};
    ///
    /// let config = ClientConfig::new()
    ///     .with_api_key("your_api_key_here")
    ///     .with_email("researcher@university.edu");
    ///
    /// let client = EutilsClient::new(config).unwrap();
    /// assert_eq!(client.rate_limiter().rate(), 10.0);
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.effective_user_agent())
            .timeout(config.timeout)
            .build()?;
        Ok(Self::with_client(http, config))
    }

    /// Create a client around an existing HTTP client
    pub fn with_client(http: Client, config: ClientConfig) -> Self {
        let rate_limiter = config.create_rate_limiter();
        let monitor = Monitor::with_history(config.monitor_history);
        Self {
            http,
            config,
            rate_limiter,
            monitor,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Search a database for UIDs matching `term`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use eutils_client::{ClientConfig, EutilsClient, EutilsResult, Parameters};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = EutilsClient::new(ClientConfig::new().with_email("me@example.org"))?;
    ///     let params = Parameters::new()
    ///         .with("db", "pubmed")
    ///         .with("term", "PNAS[ta] AND 97[vi]")
    ///         .with("retstart", 6)
    ///         .with("retmax", 6);
    ///
    ///     let result = client.esearch(params).await?.into_result()?;
    ///     println!("{} of {} UIDs: {:?}", result.size(), result.count(), result.uids());
    ///     Ok(())
    /// }
    /// ```
    pub async fn esearch(&self, parameters: Parameters) -> Result<QueryOutcome<EsearchAnalyzer>> {
        self.inquire(Esearch::new(), parameters, EsearchAnalyzer::new())
            .await
    }

    /// Upload UIDs to the history server
    pub async fn epost(&self, parameters: Parameters) -> Result<QueryOutcome<EpostAnalyzer>> {
        self.inquire(Epost, parameters, EpostAnalyzer::new()).await
    }

    /// Find related records in the same or another database
    pub async fn elink(&self, parameters: Parameters) -> Result<QueryOutcome<ElinkAnalyzer>> {
        self.inquire(Elink, parameters, ElinkAnalyzer::new()).await
    }

    /// Download records for an id list or a history session
    pub async fn efetch(&self, parameters: Parameters) -> Result<QueryOutcome<EfetchAnalyzer>> {
        self.inquire(Efetch::new(), parameters, EfetchAnalyzer::new())
            .await
    }

    /// Run any query type with a caller supplied analyzer
    #[instrument(skip_all, fields(eutil = %builder.eutil()))]
    pub async fn inquire<B, A>(
        &self,
        builder: B,
        parameters: Parameters,
        analyzer: A,
    ) -> Result<QueryOutcome<A>>
    where
        B: RequestBuilder,
        A: Analyzer,
    {
        let mut query = Query::new(builder, parameters);
        query.run(&self.context(), analyzer).await
    }

    /// Run a prepared query
    pub async fn run<B, A>(&self, query: &mut Query<B>, analyzer: A) -> Result<QueryOutcome<A>>
    where
        B: RequestBuilder,
        A: Analyzer,
    {
        query.run(&self.context(), analyzer).await
    }

    /// Resources for one query, honoring the rate limiter scope
    pub fn context(&self) -> QueryContext {
        let rate_limiter = match self.config.rate_limiter_scope {
            RateLimiterScope::Shared => self.rate_limiter.clone(),
            RateLimiterScope::PerQuery => self.config.create_rate_limiter(),
        };
        QueryContext::new(self.http.clone(), self.config.clone(), rate_limiter)
            .with_cancellation(self.root_token().child_token())
            .with_monitor(self.monitor.clone())
    }

    /// Stop dispatching requests for every query currently running
    ///
    /// Queries started afterwards run normally.
    pub fn cancel_all(&self) {
        let mut root = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        root.cancel();
        *root = CancellationToken::new();
        info!("Cancelled running queries");
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Limiter shared by queries under [`RateLimiterScope::Shared`]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    fn root_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
