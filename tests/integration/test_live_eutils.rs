//! Tests against the real NCBI service
//!
//! Run with `cargo test --features integration-tests --test test_live_eutils`.
//! Network trouble is reported as a warning, not a failure.

use eutils_client::{ClientConfig, EutilsClient, EutilsResult, Parameters};

fn client() -> EutilsClient {
    let email = std::env::var("EUTILS_EMAIL").unwrap_or_else(|_| "eutils-client@example.org".to_string());
    EutilsClient::new(
        ClientConfig::new()
            .with_email(email)
            .with_tool("eutils-client-tests"),
    )
    .unwrap()
}

#[tokio::test]
async fn test_esearch_exact_range_integration() {
    let client = client();
    let params = Parameters::new()
        .with("db", "pubmed")
        .with("term", "PNAS[ta] AND 97[vi]")
        .with("retstart", 6)
        .with("retmax", 6);

    match client.esearch(params).await {
        Ok(outcome) => match outcome.into_result() {
            Ok(result) => {
                assert_eq!(result.size(), 6);
                assert!(result.count() > 6);
                println!("UIDs 7-12 of {}: {:?}", result.count(), result.uids());
            }
            Err(e) => eprintln!("Warning: esearch did not complete: {}", e),
        },
        Err(e) => panic!("esearch rejected valid parameters: {}", e),
    }
}

#[tokio::test]
async fn test_epost_then_efetch_integration() {
    let client = client();
    let posted = client
        .epost(
            Parameters::new()
                .with("db", "pubmed")
                .with("id", "11237011,12466850"),
        )
        .await
        .unwrap();

    let posted = match posted.into_result() {
        Ok(posted) => posted,
        Err(e) => {
            eprintln!("Warning: epost did not complete: {}", e);
            return;
        }
    };
    let follow_up = posted.follow_up().expect("epost returns a history session");

    match client
        .efetch(follow_up.with("rettype", "abstract").with("retmode", "text"))
        .await
        .unwrap()
        .into_result()
    {
        Ok(fetched) => {
            assert_eq!(fetched.size(), 2);
            assert!(!fetched.text().is_empty());
        }
        Err(e) => eprintln!("Warning: efetch did not complete: {}", e),
    }
}

#[tokio::test]
async fn test_elink_neighbors_integration() {
    let client = client();
    let outcome = client
        .elink(
            Parameters::new()
                .with("dbfrom", "pubmed")
                .with("db", "pubmed")
                .with("id", "31978945"),
        )
        .await
        .unwrap();

    match outcome.into_result() {
        Ok(result) => {
            let related = result.uids("pubmed");
            println!("Found {} related articles", related.len());
            assert!(!related.is_empty());
        }
        Err(e) => eprintln!("Warning: elink did not complete: {}", e),
    }
}
