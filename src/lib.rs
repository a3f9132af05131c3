//! # E-utilities Client
//!
//! A rate-limited, concurrent request engine for the NCBI E-utilities
//! (esearch, epost, elink, efetch).
//!
//! A logical query is planned into one or more HTTP requests (paging large
//! result sets after a count-only discovery request), executed by a bounded
//! worker pool under a shared rate limit with retries on transient failures,
//! and merged by a per-query-type analyzer.
//!
//! ## Features
//!
//! - **Rate Limiting**: 3 requests/second, or 10 with an API key, across all workers
//! - **Pagination**: Ranges larger than the per-response cap are split automatically
//! - **History Server**: WebEnv / query_key sessions are created, reused and chained
//! - **Partial Failure**: One failed page never discards the others
//! - **Pluggable**: Bring your own [`RequestBuilder`] and [`Analyzer`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use eutils_client::{ClientConfig, EutilsClient, Parameters, QueryStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new()
//!         .with_email("researcher@university.edu")
//!         .with_tool("my-pipeline");
//!     let client = EutilsClient::new(config)?;
//!
//!     // Search with a history session, then fetch the 1000 hits it retrieved.
//!     // `session_follow_up()` would fetch every match in the session instead.
//!     let search = client
//!         .esearch(
//!             Parameters::new()
//!                 .with("db", "pubmed")
//!                 .with("term", "covid-19 treatment")
//!                 .with("usehistory", true)
//!                 .with("limit", 1000),
//!         )
//!         .await?
//!         .into_result()?;
//!
//!     if let Some(follow_up) = search.follow_up() {
//!         let outcome = client
//!             .efetch(follow_up.with("rettype", "abstract").with("retmode", "text"))
//!             .await?;
//!         match outcome.status() {
//!             QueryStatus::Succeeded => println!("{}", outcome.into_result()?.text()),
//!             status => eprintln!("fetch {status}: {} failed requests", outcome.failed_requests().len()),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod client;
pub mod config;
pub mod error;
pub mod eutils;
pub mod monitor;
pub mod pool;
pub mod query;
pub mod rate_limit;
pub mod request;
pub mod retry;

// Re-export main types for convenience
pub use analyzer::{Analyzer, EutilsResult};
pub use client::EutilsClient;
pub use config::{ClientConfig, RateLimiterScope};
pub use error::{EutilsError, Result};
pub use eutils::{
    Efetch, EfetchAnalyzer, EfetchResult, Elink, ElinkAnalyzer, ElinkResult, Epost, EpostAnalyzer,
    EpostResult, Esearch, EsearchAnalyzer, EsearchResult, IdCheck, IdUrls, LinkInfo, LinkOut,
};
pub use monitor::{DEFAULT_MONITOR_HISTORY, Monitor, QueryTiming};
pub use pool::RequestPool;
pub use query::{
    Discovery, ItemRange, Page, Query, QueryContext, QueryOutcome, QueryState, QueryStatus,
    RequestBuilder, RequestCheck, plan_pages,
};
pub use rate_limit::RateLimiter;
pub use request::{
    Eutil, FailureKind, HistorySession, Method, Parameters, Request, RequestFailure, RequestId,
    RequestStatus,
};
pub use retry::{RetryConfig, RetryableError};
