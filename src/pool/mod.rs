//! Request pool: bounded concurrent execution of requests
//!
//! A pool belongs to one query. Requests are queued with
//! [`submit`](RequestPool::submit) and run by [`drain`](RequestPool::drain),
//! which keeps at most `concurrency` requests in flight, each in its own task.
//! Workers report finished requests back to the drain loop, which is the only
//! place that touches the analyzer and the succeeded/failed sets.

mod transport;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::analyzer::Analyzer;
use crate::config::ClientConfig;
use crate::error::{EutilsError, Result};
use crate::rate_limit::RateLimiter;
use crate::request::{Request, RequestFailure, RequestId, RequestStatus};

pub(crate) use transport::Transport;

/// Bounded worker pool feeding one analyzer
pub struct RequestPool<A: Analyzer> {
    transport: Arc<Transport>,
    concurrency: usize,
    analyzer: A,
    pending: VecDeque<Request>,
    succeeded: Vec<Request>,
    failed: Vec<Request>,
    submitted: usize,
    closed: bool,
}

impl<A: Analyzer> RequestPool<A> {
    /// Create a pool that sends requests with `http`, paced by `rate_limiter`
    ///
    /// Identity parameters, base URL, retry policy and the concurrency cap
    /// come from `config`.
    pub fn new(http: Client, config: &ClientConfig, rate_limiter: RateLimiter, analyzer: A) -> Self {
        Self {
            transport: Arc::new(Transport::new(http, config, rate_limiter)),
            concurrency: config.concurrency.max(1),
            analyzer,
            pending: VecDeque::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            submitted: 0,
            closed: false,
        }
    }

    /// Abort dispatch of queued requests once `cancel` fires
    ///
    /// Requests that have not yet passed the rate limiter fail with
    /// [`FailureKind::Cancelled`](crate::FailureKind::Cancelled).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        let transport = Transport::clone(&self.transport).with_cancellation(cancel);
        self.transport = Arc::new(transport);
        self
    }

    /// Queue a request for execution
    ///
    /// Never waits. Fails with [`EutilsError::PoolClosed`] once the pool has
    /// been drained.
    pub fn submit(&mut self, request: Request) -> Result<RequestId> {
        if self.closed {
            return Err(EutilsError::PoolClosed);
        }
        let id = request.id();
        debug!(request_id = id, eutil = %request.eutil(), "Request submitted");
        self.pending.push_back(request);
        self.submitted += 1;
        Ok(id)
    }

    /// Run every submitted request to a terminal state
    ///
    /// Closes the pool. Calling it again returns immediately.
    #[instrument(skip(self), fields(pending = self.pending.len(), concurrency = self.concurrency))]
    pub async fn drain(&mut self) {
        self.closed = true;
        if self.pending.is_empty() {
            return;
        }

        let mut workers: JoinSet<Request> = JoinSet::new();
        let mut in_flight: HashMap<RequestId, Request> = HashMap::new();

        loop {
            while workers.len() < self.concurrency {
                let Some(mut request) = self.pending.pop_front() else {
                    break;
                };
                request.mark_in_flight();
                in_flight.insert(request.id(), request.clone());

                let transport = Arc::clone(&self.transport);
                workers.spawn(async move { transport.execute(request).await });
            }

            match workers.join_next().await {
                Some(Ok(request)) => {
                    in_flight.remove(&request.id());
                    self.complete(request);
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Request worker stopped without a result");
                }
                None => break,
            }
        }

        // Workers that panicked never handed their request back
        for (_, mut request) in in_flight.drain() {
            request.mark_failed(RequestFailure::aborted());
            self.failed.push(request);
        }

        info!(
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            "Request pool drained"
        );
    }

    /// Whether any request ended failed
    pub fn has_failed_requests(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Failed requests, for diagnostics
    pub fn failed_requests(&self) -> &[Request] {
        &self.failed
    }

    pub fn succeeded_requests(&self) -> &[Request] {
        &self.succeeded
    }

    /// Number of requests accepted by [`submit`](RequestPool::submit)
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Number of requests still waiting for a worker
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether the pool has been drained and refuses new requests
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.transport.cancellation_token()
    }

    /// Analyzer, succeeded requests and failed requests
    pub fn into_parts(self) -> (A, Vec<Request>, Vec<Request>) {
        (self.analyzer, self.succeeded, self.failed)
    }

    fn complete(&mut self, mut request: Request) {
        if request.status() != RequestStatus::Succeeded {
            if let Some(failure) = request.failure() {
                warn!(
                    request_id = request.id(),
                    kind = ?failure.kind,
                    status = ?failure.status,
                    "Request ended failed"
                );
            }
            self.failed.push(request);
            return;
        }

        let interpreted = self
            .analyzer
            .interpret(&request, request.response().unwrap_or_default());
        request.release_response();

        match interpreted {
            Ok(()) => self.succeeded.push(request),
            Err(err) => {
                warn!(request_id = request.id(), error = %err, "Response could not be interpreted");
                request.mark_failed(RequestFailure::interpretation(&err));
                self.failed.push(request);
            }
        }
    }
}
