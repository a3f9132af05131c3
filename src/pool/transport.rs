//! HTTP execution of a single request, with rate limiting and retries

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{EutilsError, Result};
use crate::rate_limit::RateLimiter;
use crate::request::{Method, Request, RequestFailure};
use crate::retry::{RetryConfig, with_retry};

/// Longest response body kept in a rejection message
const MAX_ERROR_BODY: usize = 500;

/// Everything a worker needs to turn a [`Request`] into an HTTP call
#[derive(Clone)]
pub(crate) struct Transport {
    http: Client,
    base_url: String,
    api_params: Vec<(String, String)>,
    retry_config: RetryConfig,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
}

impl Transport {
    pub(crate) fn new(http: Client, config: &ClientConfig, rate_limiter: RateLimiter) -> Self {
        Self {
            http,
            base_url: config.effective_base_url().to_string(),
            api_params: config.build_api_params(),
            retry_config: config.retry_config.clone(),
            rate_limiter,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `request` to a terminal state
    pub(crate) async fn execute(&self, mut request: Request) -> Request {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let outcome = {
            let counter = &attempts;
            let target = &request;
            with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    self.send_once(target)
                },
                &self.retry_config,
                "E-utilities request",
            )
            .await
        };

        request.set_attempts(attempts.load(Ordering::SeqCst));
        request.set_duration(started.elapsed());

        match outcome {
            Ok(payload) => {
                debug!(
                    request_id = request.id(),
                    attempts = request.attempts(),
                    bytes = payload.len(),
                    "Request succeeded"
                );
                request.mark_succeeded(payload);
            }
            Err(err) => {
                warn!(
                    request_id = request.id(),
                    attempts = request.attempts(),
                    error = %err,
                    "Request failed"
                );
                request.mark_failed(RequestFailure::from_error(&err));
            }
        }

        request
    }

    /// One attempt: wait for a rate limit slot, then send
    async fn send_once(&self, request: &Request) -> Result<String> {
        self.rate_limiter.acquire_or_cancel(&self.cancel).await?;

        let url = format!("{}/{}", self.base_url, request.eutil().path());
        let mut params = request.parameters().clone();
        for (key, value) in &self.api_params {
            params.set(key.as_str(), value);
        }

        debug!(
            request_id = request.id(),
            eutil = %request.eutil(),
            method = ?request.method(),
            "Making E-utilities API request"
        );

        let response = match request.method() {
            Method::Get => {
                let full_url = format!("{}?{}", url, params.to_query_string());
                self.http.get(&full_url).send().await?
            }
            Method::Post => {
                let form: Vec<(&str, &str)> = params.iter().collect();
                self.http.post(&url).form(&form).send().await?
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }

        let reason = status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string();

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(EutilsError::ApiError {
                status: status.as_u16(),
                message: reason,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let body = body.trim();
        let message = if body.is_empty() {
            reason
        } else {
            body.chars().take(MAX_ERROR_BODY).collect()
        };

        Err(EutilsError::PermanentRequestError {
            status: status.as_u16(),
            message,
        })
    }
}
