//! Search PubMed and fetch the abstracts of every hit through the history server
//!
//! ```text
//! EUTILS_EMAIL=me@example.org cargo run --example search_and_fetch -- "asthma[mh] AND 2020[dp]" 25
//! ```
//!
//! Set `RUST_LOG=eutils_client=debug` to watch requests being planned and sent.

use std::env;

use eutils_client::{ClientConfig, EutilsClient, EutilsResult, Parameters, QueryStatus};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let term = args.next().unwrap_or_else(|| "covid-19 treatment".to_string());
    let limit: usize = match args.next() {
        Some(limit) => limit.parse()?,
        None => 20,
    };
    let email = env::var("EUTILS_EMAIL")?;

    let client = EutilsClient::new(
        ClientConfig::new()
            .with_email(email)
            .with_tool("eutils-client-demo"),
    )?;
    println!(
        "Rate limit: {} requests/second",
        client.rate_limiter().rate()
    );

    let search = client
        .esearch(
            Parameters::new()
                .with("db", "pubmed")
                .with("term", &term)
                .with("usehistory", true)
                .with("limit", limit),
        )
        .await?
        .into_result()?;

    println!(
        "{} matches for {:?}, fetching {}",
        search.count(),
        term,
        search.size()
    );
    if let Some(translation) = search.query_translation() {
        println!("Searched as: {translation}");
    }

    let Some(follow_up) = search.follow_up() else {
        eprintln!("No history session returned, nothing to fetch");
        return Ok(());
    };

    let outcome = client
        .efetch(
            follow_up
                .with("rettype", "abstract")
                .with("retmode", "text"),
        )
        .await?;

    match outcome.status() {
        QueryStatus::Succeeded => {}
        status => eprintln!(
            "Fetch {status}: {} of {} requests failed",
            outcome.failed_requests().len(),
            outcome.request_count()
        ),
    }
    if let Some(fetched) = outcome.result() {
        println!("{}", fetched.text());
    }

    Ok(())
}
