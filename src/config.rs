//! Client configuration
//!
//! NCBI requires every E-utilities call to identify the calling tool and a
//! contact email. An API key raises the permitted request rate from 3 to 10
//! requests per second.

use std::env;
use std::time::Duration;

use crate::error::{EutilsError, Result};
use crate::monitor::DEFAULT_MONITOR_HISTORY;
use crate::query::RequestCheck;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryConfig;

/// Default E-utilities endpoint
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Environment variable consulted for an API key when none is set explicitly
pub const DEFAULT_API_KEY_VAR: &str = "NCBI_API_KEY";

/// Default tool name sent with every request
pub const DEFAULT_TOOL: &str = "eutils-client";

/// Whether queries share one rate limiter or each get their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimiterScope {
    /// One limiter per client, shared by every query it runs
    #[default]
    Shared,
    /// A fresh limiter for every query
    PerQuery,
}

/// Configuration for [`EutilsClient`](crate::EutilsClient) and request pools
///
/// # Example
///
/// ```
/// use eutils_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_email("researcher@university.edu")
///     .with_tool("my-pipeline")
///     .with_api_key("your_api_key_here")
///     .with_concurrency(4)
///     .with_timeout(Duration::from_secs(60));
///
/// assert_eq!(config.effective_rate_limit(), 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit NCBI API key
    pub api_key: Option<String>,
    /// Environment variable to read the API key from (default `NCBI_API_KEY`)
    pub api_key_var: Option<String>,
    /// Contact email, required by NCBI usage policy
    pub email: Option<String>,
    /// Tool name, sent as the `tool` parameter
    pub tool: Option<String>,
    /// Rate limit override in requests per second
    pub rate_limit: Option<f64>,
    /// Base URL override
    pub base_url: Option<String>,
    /// User agent override
    pub user_agent: Option<String>,
    /// HTTP timeout per attempt
    pub timeout: Duration,
    /// Retry policy for transient failures
    pub retry_config: RetryConfig,
    /// Maximum number of requests a pool executes concurrently
    pub concurrency: usize,
    /// Rate limiter sharing policy
    pub rate_limiter_scope: RateLimiterScope,
    /// Default policy for turning request failures into a query status
    pub request_check: RequestCheck,
    /// Finished query timings the client's monitor keeps
    pub monitor_history: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_var: None,
            email: None,
            tool: None,
            rate_limit: None,
            base_url: None,
            user_agent: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            concurrency: 3,
            rate_limiter_scope: RateLimiterScope::default(),
            request_check: RequestCheck::default(),
            monitor_history: DEFAULT_MONITOR_HISTORY,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read the API key from a different environment variable
    pub fn with_api_key_var<S: Into<String>>(mut self, var: S) -> Self {
        self.api_key_var = Some(var.into());
        self
    }

    /// Set the contact email
    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the tool name
    pub fn with_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Override the rate limit (requests per second)
    pub fn with_rate_limit(mut self, rate_limit: f64) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Point the client at a different endpoint (mirrors, mock servers)
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set a custom user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Set the number of concurrent workers per pool
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Choose between a shared or per-query rate limiter
    pub fn with_rate_limiter_scope(mut self, scope: RateLimiterScope) -> Self {
        self.rate_limiter_scope = scope;
        self
    }

    /// Set the default request check policy
    pub fn with_request_check(mut self, request_check: RequestCheck) -> Self {
        self.request_check = request_check;
        self
    }

    /// Set how many finished query timings the monitor keeps
    pub fn with_monitor_history(mut self, monitor_history: usize) -> Self {
        self.monitor_history = monitor_history;
        self
    }

    /// API key in effect: the explicit one, else the environment variable
    pub fn effective_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        let var = self.api_key_var.as_deref().unwrap_or(DEFAULT_API_KEY_VAR);
        env::var(var).ok().filter(|k| !k.trim().is_empty())
    }

    /// Rate limit in effect (requests per second)
    pub fn effective_rate_limit(&self) -> f64 {
        match self.rate_limit {
            Some(rate) => rate,
            None if self.effective_api_key().is_some() => 10.0,
            None => 3.0,
        }
    }

    /// Base URL in effect, without a trailing slash
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// User agent in effect
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("eutils-client/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Tool name in effect
    pub fn effective_tool(&self) -> &str {
        self.tool.as_deref().unwrap_or(DEFAULT_TOOL)
    }

    /// Identity parameters appended to every request
    pub fn build_api_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("tool".to_string(), self.effective_tool().to_string())];

        if let Some(email) = &self.email {
            params.push(("email".to_string(), email.clone()));
        }

        if let Some(api_key) = self.effective_api_key() {
            params.push(("api_key".to_string(), api_key));
        }

        params
    }

    /// Create a rate limiter honoring the effective rate limit
    pub fn create_rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.effective_rate_limit())
    }

    /// Check fields the remote service or the engine cannot work without
    pub fn validate(&self) -> Result<()> {
        match self.email.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(EutilsError::ConfigurationError(
                    "a contact email is required by NCBI usage policy".to_string(),
                ));
            }
            Some(email) if !email.contains('@') => {
                return Err(EutilsError::ConfigurationError(format!(
                    "invalid contact email: {email}"
                )));
            }
            Some(_) => {}
        }

        if self.effective_tool().trim().is_empty() {
            return Err(EutilsError::ConfigurationError(
                "tool name must not be empty".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(EutilsError::ConfigurationError(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let rate = self.effective_rate_limit();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EutilsError::ConfigurationError(format!(
                "rate limit must be positive, got {rate}"
            )));
        }

        Ok(())
    }
}
