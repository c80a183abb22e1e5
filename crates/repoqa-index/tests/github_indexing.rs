use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use repoqa_index::source::GithubSource;
use repoqa_index::{
    BackoffPolicy, FetchConfig, IndexOutcome, Indexer, IndexerConfig, RepoRef, Retriever,
};
use repoqa_llm::mock::MockProvider;
use repoqa_memory::{InMemoryVectorStore, VectorStore};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH_PY: &str = "import jwt\n\ndef verify(token):\n    \"\"\"JWT verification of the session token.\"\"\"\n    return jwt.decode(token, KEY)\n";
const BILLING_GO: &str = "package billing\n\nfunc Charge(card Card) error {\n\treturn nil\n}\n";

fn repo() -> RepoRef {
    RepoRef::new("acme", "svc", "main")
}

fn config() -> IndexerConfig {
    IndexerConfig {
        fetch: FetchConfig {
            batch_size: 2,
            batch_pause: Duration::from_millis(1),
            backoff: BackoffPolicy {
                max_attempts: 3,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
        },
        collection: "it_code".into(),
        vector_size: 64,
        ..IndexerConfig::default()
    }
}

async fn mount_tree(server: &MockServer, entries: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/svc/git/trees/main"))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "deadbeef",
            "truncated": false,
            "tree": entries
        })))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, file: &str, content: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/svc/contents/{file}")))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "path": file,
            "size": content.len(),
            "encoding": "base64",
            "content": STANDARD.encode(content)
        })))
        .mount(server)
        .await;
}

fn indexer(
    server: &MockServer,
    provider: Arc<MockProvider>,
    store: &Arc<InMemoryVectorStore>,
) -> Indexer<GithubSource, MockProvider> {
    let source = GithubSource::new("ghp_test")
        .unwrap()
        .with_base_url(server.uri());
    let store: Arc<dyn VectorStore> = store.clone();
    Indexer::new(source, provider, store, config()).unwrap()
}

#[tokio::test]
async fn indexes_only_supported_files_from_github() {
    let server = MockServer::start().await;
    mount_tree(
        &server,
        json!([
            {"path": "a.py", "type": "blob", "size": 40},
            {"path": "b.png", "type": "blob", "size": 1000},
            {"path": "c.md", "type": "blob", "size": 12}
        ]),
    )
    .await;
    mount_file(&server, "a.py", "def handler(event):\n    return event\n\n\n").await;

    let store = Arc::new(InMemoryVectorStore::new());
    let report = indexer(&server, Arc::new(MockProvider::hashed(64)), &store)
        .index(&repo())
        .await
        .unwrap();

    assert_eq!(report.outcome, IndexOutcome::Indexed);
    assert_eq!(report.files_selected, 1);
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(store.count("it_code").await.unwrap(), 1);
}

#[tokio::test]
async fn transient_and_broken_files_do_not_abort_the_run() {
    let server = MockServer::start().await;
    mount_tree(
        &server,
        json!([
            {"path": "src/auth.py", "type": "blob", "size": 120},
            {"path": "src/pkg", "type": "blob", "size": 10},
            {"path": "billing/charge.go", "type": "blob", "size": 70},
            {"path": "src/gone.rs", "type": "blob", "size": 5}
        ]),
    )
    .await;

    // One 503 before the real content.
    Mock::given(method("GET"))
        .and(path("/repos/acme/svc/contents/src/auth.py"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_file(&server, "src/auth.py", AUTH_PY).await;
    mount_file(&server, "billing/charge.go", BILLING_GO).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/svc/contents/src/gone.rs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryVectorStore::new());
    let report = indexer(&server, Arc::new(MockProvider::hashed(64)), &store)
        .index(&repo())
        .await
        .unwrap();

    // "src/pkg" has no extension and never reaches the fetcher.
    assert_eq!(report.files_selected, 3);
    assert_eq!(report.files_fetched, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "src/gone.rs");
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(report.chunks_indexed, 2);
}

#[tokio::test]
async fn missing_branch_aborts_at_list_step() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryVectorStore::new());
    let err = indexer(&server, Arc::new(MockProvider::hashed(64)), &store)
        .index(&repo())
        .await
        .unwrap_err();
    assert_eq!(err.step(), "list");
    assert!(err.to_string().contains("acme/svc@main"));
}

#[tokio::test]
async fn indexed_chunks_are_retrievable() {
    let server = MockServer::start().await;
    mount_tree(
        &server,
        json!([
            {"path": "auth.py", "type": "blob", "size": 120},
            {"path": "charge.go", "type": "blob", "size": 70}
        ]),
    )
    .await;
    mount_file(&server, "auth.py", AUTH_PY).await;
    mount_file(&server, "charge.go", BILLING_GO).await;

    let provider = Arc::new(MockProvider::hashed(64));
    let store = Arc::new(InMemoryVectorStore::new());
    indexer(&server, Arc::clone(&provider), &store)
        .index(&repo())
        .await
        .unwrap();

    let retriever = Retriever::new(provider, store, "it_code", 1);
    let hits = retriever
        .retrieve("How does JWT token verification work?", Some(&repo()))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, "auth.py");
}
