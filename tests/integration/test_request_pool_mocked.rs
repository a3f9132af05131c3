//! Integration tests for the request pool using mocked HTTP responses
//!
//! These tests drive a `RequestPool` directly against a wiremock server to
//! check retries, failure classification, concurrency and cancellation.

mod common;

use std::time::{Duration, Instant};

use common::{fast_retry, mock_config};
use eutils_client::{
    Analyzer, EutilsError, EutilsResult, Eutil, FailureKind, Method, Parameters, RateLimiter,
    Request, RequestPool, RequestStatus,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default)]
struct Bodies(Vec<String>);

impl EutilsResult for Bodies {
    fn size(&self) -> usize {
        self.0.len()
    }

    fn dump(&self) -> serde_json::Value {
        serde_json::json!(self.0)
    }
}

/// Keeps every payload, rejects payloads equal to "garbage"
#[derive(Default)]
struct BodyCollector {
    bodies: Bodies,
}

impl Analyzer for BodyCollector {
    type Output = Bodies;

    fn interpret(&mut self, _request: &Request, payload: &str) -> eutils_client::Result<()> {
        if payload == "garbage" {
            return Err(EutilsError::InvalidResponse("garbage payload".to_string()));
        }
        self.bodies.0.push(payload.to_string());
        Ok(())
    }

    fn is_success(&self) -> bool {
        true
    }

    fn result(&self) -> &Bodies {
        &self.bodies
    }

    fn into_result(self) -> Bodies {
        self.bodies
    }
}

fn create_pool(server: &MockServer, max_retries: u32, concurrency: usize) -> RequestPool<BodyCollector> {
    let config = mock_config(&server.uri())
        .with_retry_config(fast_retry(max_retries))
        .with_concurrency(concurrency);
    RequestPool::new(
        Client::new(),
        &config,
        RateLimiter::new(100.0),
        BodyCollector::default(),
    )
}

fn search_request(term: &str) -> Request {
    Request::new(
        "test-query",
        Eutil::ESearch,
        Method::Get,
        Parameters::new().with("db", "pubmed").with("term", term),
    )
}

#[tokio::test]
#[traced_test]
async fn test_drain_completes_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(3)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 2, 3);
    for term in ["a", "b", "c"] {
        pool.submit(search_request(term)).unwrap();
    }
    pool.drain().await;

    assert!(!pool.has_failed_requests());
    assert_eq!(pool.succeeded_requests().len(), 3);
    for request in pool.succeeded_requests() {
        assert_eq!(request.status(), RequestStatus::Succeeded);
        assert_eq!(request.attempts(), 1);
        assert_eq!(request.response(), None);
        assert_eq!(request.response_len(), Some(2));
    }
    assert_eq!(pool.analyzer().result().size(), 3);
}

#[tokio::test]
#[traced_test]
async fn test_identity_parameters_on_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("tool", "eutils-client-tests"))
        .and(query_param("email", "test@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 0, 2);
    pool.submit(search_request("a")).unwrap();
    pool.submit(search_request("b")).unwrap();
    pool.drain().await;

    assert!(!pool.has_failed_requests());
}

#[tokio::test]
#[traced_test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 3, 1);
    pool.submit(search_request("a")).unwrap();
    pool.drain().await;

    assert!(!pool.has_failed_requests());
    assert_eq!(pool.succeeded_requests()[0].attempts(), 3);
    assert_eq!(pool.analyzer().result().0, vec!["recovered"]);
}

#[tokio::test]
#[traced_test]
async fn test_exhausted_retries_fail_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 2, 1);
    pool.submit(search_request("a")).unwrap();
    pool.drain().await;

    assert!(pool.has_failed_requests());
    let failed = &pool.failed_requests()[0];
    assert_eq!(failed.attempts(), 3);
    let failure = failed.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Exhausted);
    assert_eq!(failure.status, Some(503));
}

#[tokio::test]
#[traced_test]
async fn test_throttling_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 1, 1);
    pool.submit(search_request("a")).unwrap();
    pool.drain().await;

    let failure = pool.failed_requests()[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Exhausted);
    assert_eq!(failure.status, Some(429));
}

#[tokio::test]
#[traced_test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid query syntax"))
        .expect(1)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 3, 1);
    pool.submit(search_request("((")).unwrap();
    pool.drain().await;

    let failed = &pool.failed_requests()[0];
    assert_eq!(failed.attempts(), 1);
    let failure = failed.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert_eq!(failure.status, Some(400));
    assert!(failure.message.contains("Invalid query syntax"));
}

#[tokio::test]
#[traced_test]
async fn test_failure_does_not_cancel_siblings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("term", "bad"))
        .respond_with(ResponseTemplate::new(400))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 1, 2);
    for term in ["a", "bad", "b", "c"] {
        pool.submit(search_request(term)).unwrap();
    }
    pool.drain().await;

    assert_eq!(pool.failed_requests().len(), 1);
    assert_eq!(pool.succeeded_requests().len(), 3);
    assert_eq!(
        pool.failed_requests()[0].parameters().get("term"),
        Some("bad")
    );
}

#[tokio::test]
#[traced_test]
async fn test_interpretation_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
        .expect(1)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 3, 1);
    pool.submit(search_request("a")).unwrap();
    pool.drain().await;

    let failure = pool.failed_requests()[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Interpretation);
    assert!(pool.analyzer().result().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_drain_is_idempotent_and_closes_pool() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 0, 1);
    pool.submit(search_request("a")).unwrap();
    pool.drain().await;

    let start = Instant::now();
    pool.drain().await;
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(pool.succeeded_requests().len(), 1);

    let err = pool.submit(search_request("b")).unwrap_err();
    assert!(matches!(err, EutilsError::PoolClosed));
    assert_eq!(pool.submitted(), 1);
}

#[tokio::test]
#[traced_test]
async fn test_concurrency_cap_is_respected() {
    let delay = Duration::from_millis(200);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok").set_delay(delay))
        .expect(6)
        .mount(&server)
        .await;

    let mut pool = create_pool(&server, 0, 2);
    for i in 0..6 {
        pool.submit(search_request(&i.to_string())).unwrap();
    }

    let start = Instant::now();
    pool.drain().await;
    let elapsed = start.elapsed();

    // Six requests, two at a time, 200ms each
    assert!(
        elapsed >= delay * 3 - Duration::from_millis(20),
        "drain took {elapsed:?}, expected at least three rounds"
    );
    assert_eq!(pool.succeeded_requests().len(), 6);
}

#[tokio::test]
#[traced_test]
async fn test_cancellation_fails_waiting_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri()).with_concurrency(4);
    let cancel = CancellationToken::new();
    let mut pool = RequestPool::new(
        Client::new(),
        &config,
        RateLimiter::new(1.0),
        BodyCollector::default(),
    )
    .with_cancellation(cancel.clone());
    for term in ["a", "b", "c", "d"] {
        pool.submit(search_request(term)).unwrap();
    }

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });
    pool.drain().await;
    canceller.await.unwrap();

    assert_eq!(pool.succeeded_requests().len(), 1);
    assert_eq!(pool.failed_requests().len(), 3);
    assert!(
        pool.failed_requests()
            .iter()
            .all(|r| r.failure().unwrap().kind == FailureKind::Cancelled)
    );
}
