//! Integration tests for elink using mocked HTTP responses

mod common;

use common::{create_mock_client, request_params};
use eutils_client::{
    EutilsError, EutilsResult, FailureKind, HistorySession, IdCheck, Parameters, QueryStatus,
};
use serde_json::json;
use tracing_test::traced_test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn neighbor_response() -> serde_json::Value {
    json!({
        "header": { "type": "elink", "version": "0.3" },
        "linksets": [{
            "dbfrom": "pubmed",
            "ids": ["31978945"],
            "linksetdbs": [
                {
                    "dbto": "pubmed",
                    "linkname": "pubmed_pubmed",
                    "links": ["33515491", "32267449", "32199087"]
                },
                {
                    "dbto": "pmc",
                    "linkname": "pubmed_pmc",
                    "links": ["7092803"]
                }
            ]
        }]
    })
}

#[tokio::test]
#[traced_test]
async fn test_elink_neighbors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .and(query_param("dbfrom", "pubmed"))
        .and(query_param("id", "31978945"))
        .and(query_param("retmode", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(neighbor_response()))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("db", "pubmed,pmc")
                .with("id", "31978945"),
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    let result = outcome.into_result().unwrap();
    assert_eq!(result.linksets.len(), 1);
    assert_eq!(result.linksets[0].ids, vec!["31978945"]);
    assert_eq!(result.uids("pubmed"), vec!["33515491", "32267449", "32199087"]);
    assert_eq!(result.uids("pmc"), vec!["7092803"]);
    assert_eq!(result.size(), 4);
}

#[tokio::test]
#[traced_test]
async fn test_elink_history_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "linksets": [{
                "dbfrom": "pubmed",
                "ids": [31978945],
                "webenv": "MCID_link",
                "linksetdbhistories": [
                    { "dbto": "pmc", "linkname": "pubmed_pmc", "querykey": 4 }
                ]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let result = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("db", "pmc")
                .with("id", "31978945")
                .with("cmd", "neighbor_history"),
        )
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(
        result.history_sessions(),
        vec![HistorySession::new("MCID_link", "4")]
    );
    assert_eq!(result.linksets[0].ids, vec!["31978945"]);
}

#[tokio::test]
#[traced_test]
async fn test_elink_acheck_link_infos() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .and(query_param("cmd", "acheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "header": { "type": "elink", "version": "0.3" },
            "linksets": [{
                "dbfrom": "pubmed",
                "idchecklist": {
                    "idlinksets": [{
                        "id": "15718680",
                        "linkinfos": [
                            {
                                "dbto": "books",
                                "linkname": "pubmed_books_refs",
                                "menutag": "Cited in Books",
                                "htmltag": "Cited in Books",
                                "priority": "185"
                            },
                            {
                                "dbto": "pmc",
                                "linkname": "pubmed_pmc_refs",
                                "menutag": "Cited in PMC",
                                "htmltag": "Cited in PMC",
                                "priority": "180"
                            }
                        ]
                    }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("cmd", "acheck")
                .with("id", "15718680"),
        )
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert!(!request_params(&received[0]).contains_key("db"));

    assert_eq!(outcome.status(), QueryStatus::Succeeded);
    let result = outcome.into_result().unwrap();
    assert_eq!(result.size(), 2);
    assert!(!result.is_empty());

    let checks: Vec<&IdCheck> = result.checks().collect();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].id, "15718680");
    let targets: Vec<(&str, Option<&str>)> = checks[0]
        .link_infos
        .iter()
        .map(|info| (info.db_to.as_str(), info.priority.as_deref()))
        .collect();
    assert_eq!(targets, vec![("books", Some("185")), ("pmc", Some("180"))]);
    assert_eq!(checks[0].link_infos[1].html_tag.as_deref(), Some("Cited in PMC"));
}

#[tokio::test]
async fn test_elink_rejects_unknown_command() {
    let client = create_mock_client("http://127.0.0.1:9");
    let err = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("db", "pubmed")
                .with("cmd", "neighbour")
                .with("id", "1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EutilsError::ConfigurationError(_)));
}

#[tokio::test]
#[traced_test]
async fn test_long_id_list_is_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/elink.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "linksets": [] })))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let ids: Vec<String> = (1..=250).map(|i| (30_000_000 + i).to_string()).collect();
    let outcome = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("db", "pubmed")
                .with("id", ids.join(",")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), QueryStatus::Succeeded);
    let received = server.received_requests().await.unwrap();
    assert!(received[0].url.query().is_none());
    let params = request_params(&received[0]);
    assert_eq!(params.get("id"), Some(&ids.join(",")));
    assert_eq!(params.get("email").map(String::as_str), Some("test@example.com"));
}

#[tokio::test]
#[traced_test]
async fn test_elink_error_field_fails_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ERROR": "Invalid db name specified: pubmd"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = create_mock_client(&server.uri());

    let outcome = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmd")
                .with("db", "pubmed")
                .with("id", "1"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status(), QueryStatus::Failed);
    assert_eq!(
        outcome.failed_requests()[0].failure().unwrap().kind,
        FailureKind::Interpretation
    );
}

#[tokio::test]
async fn test_elink_requires_source_database() {
    let client = create_mock_client("http://127.0.0.1:9");
    let err = client
        .elink(Parameters::new().with("db", "pubmed").with("id", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EutilsError::ConfigurationError(_)));
}
