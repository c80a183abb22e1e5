use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use repoqa_core::Config;
use repoqa_core::bootstrap::AppBuilder;
use repoqa_core::vault::Secret;
use repoqa_index::{IndexOutcome, RepoRef};
use repoqa_llm::mock::MockProvider;
use repoqa_memory::{InMemoryVectorStore, VectorStore};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH_PY: &str = r#"import jwt

SECRET = "change-me"


def verify_token(token):
    """JWT verification: decode the bearer token and check its signature."""
    return jwt.decode(token, SECRET, algorithms=["HS256"])
"#;

const AUTH_GUIDE_PY: &str = r#""""Authentication.

How does authentication work? Every request sends a bearer token in the
Authorization header, and verify_token decodes it with the shared secret.
"""
import jwt

SECRET = "change-me"


def verify_token(token):
    return jwt.decode(token, SECRET, algorithms=["HS256"])
"#;

const BILLING_GO: &str = r"package billing

// Charge bills the card for the invoice total.
func Charge(card Card, invoice Invoice) error {
	return gateway.Submit(card, invoice.Total)
}
";

const COLLECTION: &str = "it_repoqa";

fn config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.github.api_url = server.uri();
    config.secrets.github_token = Some(Secret::new("ghp_test"));
    config.qdrant.collection = COLLECTION.into();
    config.qdrant.vector_size = 64;
    config.index.batch_size = 2;
    config.index.batch_pause_ms = 1;
    config.index.min_backoff_ms = 1;
    config.index.max_backoff_ms = 4;
    config.retrieval.top_k = 1;
    config
}

async fn mount_repo(server: &MockServer, repo: &str, files: &[(&str, &str)], extra: &[&str]) {
    let mut tree: Vec<serde_json::Value> = files
        .iter()
        .map(|(p, c)| json!({"path": p, "type": "blob", "size": c.len()}))
        .collect();
    tree.extend(
        extra
            .iter()
            .map(|p| json!({"path": p, "type": "blob", "size": 2048})),
    );
    tree.push(json!({"path": "src", "type": "tree"}));

    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/{repo}/git/trees/main")))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "abc123",
            "truncated": false,
            "tree": tree
        })))
        .mount(server)
        .await;

    for (file, content) in files {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/{repo}/contents/{file}")))
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
}

fn svc() -> RepoRef {
    RepoRef::new("acme", "svc", "main")
}

#[tokio::test]
async fn index_then_ask_answers_from_matching_file() {
    let server = MockServer::start().await;
    mount_repo(
        &server,
        "svc",
        &[("src/auth.py", AUTH_PY), ("billing/charge.go", BILLING_GO)],
        &["README.md", "assets/logo.png"],
    )
    .await;

    let app = AppBuilder::from_config(config(&server));
    let provider = Arc::new(MockProvider::hashed(64).with_echo());
    let store = Arc::new(InMemoryVectorStore::new());

    let indexer = app
        .indexer_with(app.build_source().unwrap(), Arc::clone(&provider), store.clone())
        .unwrap();
    let report = indexer.index(&svc()).await.unwrap();
    assert_eq!(report.outcome, IndexOutcome::Indexed);
    assert_eq!(report.files_listed, 4);
    assert_eq!(report.files_selected, 2);
    assert_eq!(report.documents, 2);
    assert!(report.failures.is_empty());

    let flow = app
        .flow_with(Arc::clone(&provider), Arc::clone(&provider), store, None)
        .unwrap();
    let state = flow
        .ask("How does JWT token verification work?")
        .await
        .unwrap();

    // The echo model answers with the prompt it received.
    let answer = state.answer().unwrap();
    assert!(answer.contains("file=\"src/auth.py\""));
    assert!(answer.contains("jwt.decode"));
    assert!(!answer.contains("charge.go"));
    assert!(answer.ends_with("Question: How does JWT token verification work?"));
}

#[tokio::test]
async fn authentication_question_cites_auth_module() {
    let server = MockServer::start().await;
    mount_repo(
        &server,
        "svc",
        &[("src/auth.py", AUTH_GUIDE_PY), ("billing/charge.go", BILLING_GO)],
        &[],
    )
    .await;

    let app = AppBuilder::from_config(config(&server));
    let provider = Arc::new(MockProvider::hashed(64).with_echo());
    let store = Arc::new(InMemoryVectorStore::new());
    app.indexer_with(app.build_source().unwrap(), Arc::clone(&provider), store.clone())
        .unwrap()
        .index(&svc())
        .await
        .unwrap();

    let flow = app
        .flow_with(Arc::clone(&provider), Arc::clone(&provider), store, None)
        .unwrap();
    let answer = flow
        .ask("How does authentication work?")
        .await
        .unwrap()
        .into_answer()
        .unwrap();

    assert!(answer.contains("file=\"src/auth.py\""));
    assert!(answer.contains("verify_token"));
    assert!(!answer.contains("charge.go"));
    assert!(answer.ends_with("Question: How does authentication work?"));
}

#[tokio::test]
async fn reindexing_overwrites_instead_of_duplicating() {
    let server = MockServer::start().await;
    mount_repo(
        &server,
        "svc",
        &[("src/auth.py", AUTH_PY), ("billing/charge.go", BILLING_GO)],
        &[],
    )
    .await;

    let app = AppBuilder::from_config(config(&server));
    let provider = Arc::new(MockProvider::hashed(64));
    let store = Arc::new(InMemoryVectorStore::new());
    let indexer = app
        .indexer_with(app.build_source().unwrap(), provider, store.clone())
        .unwrap();

    let first = indexer.index(&svc()).await.unwrap();
    let ids_after_first: Vec<String> = {
        let mut ids: Vec<_> = store.payloads(COLLECTION).into_keys().collect();
        ids.sort();
        ids
    };
    let second = indexer.index(&svc()).await.unwrap();
    let mut ids_after_second: Vec<_> = store.payloads(COLLECTION).into_keys().collect();
    ids_after_second.sort();

    assert_eq!(first.chunks_indexed, second.chunks_indexed);
    assert_eq!(
        store.count(COLLECTION).await.unwrap(),
        u64::try_from(first.chunks_indexed).unwrap()
    );
    assert_eq!(ids_after_first, ids_after_second);
}

#[tokio::test]
async fn empty_repository_indexes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/empty/git/trees/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "0000",
            "truncated": false,
            "tree": []
        })))
        .mount(&server)
        .await;

    let app = AppBuilder::from_config(config(&server));
    let store = Arc::new(InMemoryVectorStore::new());
    let indexer = app
        .indexer_with(
            app.build_source().unwrap(),
            Arc::new(MockProvider::hashed(64)),
            store.clone(),
        )
        .unwrap();

    let report = indexer
        .index(&RepoRef::new("acme", "empty", "main"))
        .await
        .unwrap();
    assert_eq!(report.outcome, IndexOutcome::EmptyRepository);
    assert_eq!(report.chunks_indexed, 0);
    assert!(!store.collection_exists(COLLECTION).await.unwrap());
}

#[tokio::test]
async fn scoped_question_ignores_other_repositories() {
    let server = MockServer::start().await;
    mount_repo(&server, "svc", &[("src/auth.py", AUTH_PY)], &[]).await;
    mount_repo(
        &server,
        "legacy",
        &[("auth/jwt.py", "def verify_token(token):\n    # JWT verification, legacy\n    return True\n")],
        &[],
    )
    .await;

    let app = AppBuilder::from_config(config(&server));
    let provider = Arc::new(MockProvider::hashed(64).with_echo());
    let store = Arc::new(InMemoryVectorStore::new());
    let indexer = app
        .indexer_with(app.build_source().unwrap(), Arc::clone(&provider), store.clone())
        .unwrap();
    indexer.index(&svc()).await.unwrap();
    indexer
        .index(&RepoRef::new("acme", "legacy", "main"))
        .await
        .unwrap();
    assert_eq!(store.count(COLLECTION).await.unwrap(), 2);

    let flow = app
        .flow_with(Arc::clone(&provider), provider, store, Some(svc()))
        .unwrap();
    let answer = flow
        .ask("JWT token verification")
        .await
        .unwrap()
        .into_answer()
        .unwrap();
    assert!(answer.contains("src/auth.py"));
    assert!(!answer.contains("auth/jwt.py"));
}
