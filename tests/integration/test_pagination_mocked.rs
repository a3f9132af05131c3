//! Integration tests for paginated esearch queries using mocked HTTP responses
//!
//! A `PagedEsearch` responder serves a result set page by page so the tests
//! can check discovery, page planning, limits and partial failures.

mod common;

use common::{PagedEsearch, create_mock_client, page_offsets, request_params};
use eutils_client::{
    Esearch, EsearchAnalyzer, EutilsError, EutilsResult, FailureKind, Parameters, Query,
    QueryState, QueryStatus, RequestCheck,
};
use rstest::rstest;
use tracing_test::traced_test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_paged(server: &MockServer, responder: PagedEsearch) {
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(responder)
        .mount(server)
        .await;
}

fn search(term: &str) -> Parameters {
    Parameters::new().with("db", "pubmed").with("term", term)
}

#[tokio::test]
#[traced_test]
async fn test_discovery_then_five_pages() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(97)).await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .inquire(
            Esearch::new().with_max_items(20),
            search("cancer"),
            EsearchAnalyzer::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), QueryStatus::Succeeded);
    assert!(outcome.is_success());
    assert_eq!(outcome.request_count(), 5);
    assert_eq!(outcome.discovery().map(|d| d.total), Some(97));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 6);
    assert_eq!(
        page_offsets(&received),
        vec![(0, 20), (20, 20), (40, 20), (60, 20), (80, 17)]
    );

    let result = outcome.into_result().unwrap();
    assert_eq!(result.count(), 97);
    assert_eq!(result.size(), 97);
    let expected: Vec<String> = (1..=97).map(|i| i.to_string()).collect();
    assert_eq!(result.uids(), expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
#[traced_test]
async fn test_limit_truncates_planned_range() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(97)).await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .inquire(
            Esearch::new().with_max_items(20),
            search("cancer").with("retstart", 6).with("limit", 6),
            EsearchAnalyzer::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.request_count(), 1);
    let received = server.received_requests().await.unwrap();
    assert_eq!(page_offsets(&received), vec![(6, 6)]);
    assert!(received.iter().all(|r| !request_params(r).contains_key("limit")));

    let result = outcome.into_result().unwrap();
    assert_eq!(result.uids(), vec!["7", "8", "9", "10", "11", "12"]);
}

#[tokio::test]
#[traced_test]
async fn test_exact_range_skips_discovery() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(97)).await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .esearch(search("PNAS[ta] AND 97[vi]").with("retstart", 6).with("retmax", 6))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(outcome.discovery().is_none());
    assert_eq!(outcome.result().unwrap().uids().len(), 6);
}

#[rstest]
#[case::zero_results(0, Parameters::new())]
#[case::start_beyond_total(97, Parameters::new().with("retstart", 500).with("limit", 10))]
#[tokio::test]
async fn test_empty_results_need_no_follow_ups(#[case] total: usize, #[case] extra: Parameters) {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(total)).await;
    let client = create_mock_client(&server.uri());

    let mut params = search("nothing");
    for (key, value) in extra.iter() {
        params.set(key, value);
    }
    let outcome = client.esearch(params).await.unwrap();

    assert_eq!(outcome.status(), QueryStatus::Succeeded);
    assert_eq!(outcome.request_count(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let result = outcome.into_result().unwrap();
    assert!(result.is_empty());
    assert_eq!(result.count(), total);
}

#[tokio::test]
#[traced_test]
async fn test_one_failed_page_gives_partial_result() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(97).failing_at(40)).await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .inquire(
            Esearch::new().with_max_items(20),
            search("cancer"),
            EsearchAnalyzer::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), QueryStatus::Partial);
    assert!(!outcome.is_success());
    assert_eq!(outcome.request_count(), 5);

    let failed = outcome.failed_requests();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retstart(), 40);
    assert_eq!(failed[0].failure().unwrap().kind, FailureKind::Exhausted);

    let partial = outcome.result().unwrap();
    assert_eq!(partial.size(), 77);
    assert!(!partial.uids().contains(&"41"));

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(
        err,
        EutilsError::QueryFailed { failed: 1, total: 5, .. }
    ));
}

#[tokio::test]
#[traced_test]
async fn test_strict_check_fails_on_any_failure() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(97).failing_at(80)).await;
    let client = create_mock_client(&server.uri());

    let mut query = Query::new(Esearch::new().with_max_items(20), search("cancer"))
        .with_request_check(RequestCheck::Strict);
    let outcome = client.run(&mut query, EsearchAnalyzer::new()).await.unwrap();

    assert_eq!(outcome.status(), QueryStatus::Failed);
    assert!(outcome.result().is_none());
    assert_eq!(query.state(), QueryState::Complete(QueryStatus::Failed));
    assert_eq!(outcome.query_id(), query.id());
}

#[tokio::test]
#[traced_test]
async fn test_failed_discovery_fails_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid query"))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let outcome = client.esearch(search("((")).await.unwrap();

    assert_eq!(outcome.status(), QueryStatus::Failed);
    assert_eq!(outcome.failed_requests().len(), 1);
    assert_eq!(
        outcome.failed_requests()[0].parameters().get("retmax"),
        Some("0")
    );
}

#[tokio::test]
#[traced_test]
async fn test_discovery_error_field_fails_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "esearchresult": { "ERROR": "Invalid db name specified: pubmd" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .esearch(Parameters::new().with("db", "pubmd").with("term", "x"))
        .await
        .unwrap();

    assert_eq!(outcome.status(), QueryStatus::Failed);
    let failure = outcome.failed_requests()[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Interpretation);
    assert!(failure.message.contains("pubmd"));
}

#[tokio::test]
#[traced_test]
async fn test_monitor_records_query() {
    let server = MockServer::start().await;
    mount_paged(&server, PagedEsearch::new(30)).await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .inquire(
            Esearch::new().with_max_items(10),
            search("cancer"),
            EsearchAnalyzer::new(),
        )
        .await
        .unwrap();

    let timing = client.monitor().get(outcome.query_id()).unwrap();
    assert!(!timing.is_running());
    assert_eq!(timing.requests, 3);
    assert_eq!(timing.state, QueryState::Complete(QueryStatus::Succeeded));
}
