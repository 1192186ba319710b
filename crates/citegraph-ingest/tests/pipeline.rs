use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mockito::{Matcher, Mock, Server, ServerGuard};
use reqwest::Url;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use citegraph_core::{AppConfig, Label, RawAuthor, RawPaper, RelKind, SqliteGraph, content_hash};
use citegraph_ingest::{
    HttpResponse, IngestContext, PaperExpander, ReqwestTransport, Transport,
};

fn fast_config(base_url: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.api.base_url = base_url;
    config.api.page_size = 10;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

fn context(config: AppConfig, transport: Arc<dyn Transport>) -> IngestContext {
    let store = SqliteGraph::open_in_memory().unwrap();
    IngestContext::with_parts(config, Arc::new(store), transport)
}

fn paper_json(id: &str, title: &str, author: &str) -> Value {
    json!({
        "paperId": id,
        "title": title,
        "authors": [{"authorId": format!("a-{author}"), "name": author}],
        "year": 2020,
        "venue": "GraphConf"
    })
}

async fn mock_json(server: &mut ServerGuard, path: &str, body: Value) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// P is cited by C1 and references R1; the provider also returns one untitled citing row.
async fn citation_triangle(server: &mut ServerGuard) -> Vec<Mock> {
    vec![
        mock_json(server, "/paper/P", paper_json("P", "Origin Paper", "Ada")).await,
        mock_json(
            server,
            "/paper/P/citations",
            json!({"offset": 0, "data": [
                {"citingPaper": paper_json("C1", "Citing Paper", "Grace")},
                {"citingPaper": {"paperId": "C2", "title": null}}
            ]}),
        )
        .await,
        mock_json(
            server,
            "/paper/P/references",
            json!({"offset": 0, "data": [{"citedPaper": paper_json("R1", "Cited Paper", "Alan")}]}),
        )
        .await,
        mock_json(server, "/paper/C1", paper_json("C1", "Citing Paper", "Grace")).await,
        mock_json(server, "/paper/C1/citations", json!({"offset": 0, "data": []})).await,
        mock_json(
            server,
            "/paper/C1/references",
            json!({"offset": 0, "data": [{"citedPaper": paper_json("P", "Origin Paper", "Ada")}]}),
        )
        .await,
        mock_json(server, "/paper/R1", paper_json("R1", "Cited Paper", "Alan")).await,
        mock_json(
            server,
            "/paper/R1/citations",
            json!({"offset": 0, "data": [{"citingPaper": paper_json("P", "Origin Paper", "Ada")}]}),
        )
        .await,
        mock_json(server, "/paper/R1/references", json!({"offset": 0, "data": []})).await,
    ]
}

fn reqwest_transport() -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new("citegraph-test", Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn expand_then_refresh_is_idempotent() {
    let mut server = Server::new_async().await;
    let _mocks = citation_triangle(&mut server).await;
    let ctx = context(fast_config(server.url()), reqwest_transport());

    let report = ctx.expander().expand("P").await.unwrap();

    assert_eq!(report.paper_id, "P");
    assert_eq!(report.neighbors, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.is_complete());
    assert_eq!(ctx.upsert.citations_of("P").await.unwrap(), vec!["C1"]);
    assert_eq!(ctx.upsert.references_of("P").await.unwrap(), vec!["R1"]);

    let before = ctx.upsert.stats().await.unwrap();
    assert_eq!(before.nodes_with(Label::Paper), 3);
    assert_eq!(before.nodes_with(Label::Author), 3);
    assert_eq!(before.nodes_with(Label::Venue), 1);
    assert_eq!(before.relationships_of(RelKind::References), 2);

    let summary = ctx.scheduler(Some(4)).run().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.stats.nodes_created, 0);
    assert_eq!(summary.stats.relationships_created, 0);
    assert_eq!(ctx.upsert.stats().await.unwrap(), before);
}

#[tokio::test]
async fn refresh_records_failures_and_finishes_the_batch() {
    let mut server = Server::new_async().await;
    let _mocks = citation_triangle(&mut server).await;
    let ctx = context(fast_config(server.url()), reqwest_transport());

    ctx.expander().expand("P").await.unwrap();
    // A paper the provider no longer knows about.
    ctx.add_paper(&RawPaper {
        paper_id: Some("GONE".into()),
        ..RawPaper::titled("Withdrawn Paper")
    })
    .await
    .unwrap();
    let _gone = server
        .mock("GET", "/paper/GONE")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error": "Paper not found"}"#)
        .create_async()
        .await;

    let summary = ctx.scheduler(Some(2)).run().await.unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].0, "GONE");
}

#[tokio::test]
async fn hashed_identity_survives_reingestion() {
    let ctx = context(AppConfig::default(), reqwest_transport());
    let raw = RawPaper {
        authors: Some(vec![RawAuthor {
            author_id: None,
            name: Some("Ada Lovelace".into()),
        }]),
        ..RawPaper::titled("Graph Databases")
    };

    let (paper, first) = ctx.add_paper(&raw).await.unwrap().unwrap();
    let (again, second) = ctx.add_paper(&raw).await.unwrap().unwrap();

    assert_eq!(paper.id, content_hash("Graph DatabasesAda Lovelace"));
    assert_eq!(again.id, paper.id);
    assert_eq!(first.nodes_created, 2);
    assert_eq!(first.relationships_created, 1);
    assert_eq!(second.nodes_created, 0);
    assert_eq!(second.relationships_created, 0);
}

/// Serves canned bodies by path, rejecting the first `rejections` calls with 429.
struct ThrottledTransport {
    bodies: HashMap<String, Value>,
    rejections: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Transport for ThrottledTransport {
    async fn get(&self, url: &Url, _headers: &HeaderMap) -> citegraph_ingest::Result<HttpResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.rejections {
            return Ok(HttpResponse {
                status: 429,
                retry_after: Some(Duration::from_millis(0)),
                body: String::new(),
            });
        }
        Ok(match self.bodies.get(url.path()) {
            Some(body) => HttpResponse::ok(body.to_string()),
            None => HttpResponse::status(404),
        })
    }
}

#[tokio::test]
async fn expansion_rides_out_rate_limiting() {
    let bodies = HashMap::from([
        ("/graph/v1/paper/P".to_string(), paper_json("P", "Origin Paper", "Ada")),
        (
            "/graph/v1/paper/P/citations".to_string(),
            json!({
                "offset": 0,
                "data": [{"citingPaper": paper_json("C1", "Citing Paper", "Grace")}]
            }),
        ),
        (
            "/graph/v1/paper/P/references".to_string(),
            json!({"offset": 0, "data": []}),
        ),
    ]);
    let transport = Arc::new(ThrottledTransport {
        bodies,
        rejections: 3,
        calls: AtomicU32::new(0),
    });
    let mut config = fast_config("https://api.semanticscholar.org/graph/v1".to_string());
    config.retry.max_attempts = 5;
    let ctx = context(config, transport.clone());

    let report = ctx.expander().expand("P").await.unwrap();

    assert_eq!(report.neighbors, 1);
    assert_eq!(ctx.upsert.citations_of("P").await.unwrap(), vec!["C1"]);
    // three rejected calls, then one each for the paper and both directions
    assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
}
