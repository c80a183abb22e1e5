//! Application bootstrap: config resolution and construction of the source,
//! providers, vector store, indexer, and QA flow.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use repoqa_index::source::GithubSource;
use repoqa_index::{Indexer, RepoRef, RepositorySource, Retriever};
use repoqa_llm::LlmProvider;
use repoqa_llm::openai::OpenAiProvider;
use repoqa_memory::{QdrantOps, VectorStore};

use crate::config::Config;
use crate::flow::{QaNode, RetrievalQaFlow};
use crate::vault::VaultProvider;

const DEFAULT_CONFIG_PATH: &str = "config/repoqa.toml";

/// Priority: explicit path > `REPOQA_CONFIG` env > `config/repoqa.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REPOQA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

pub struct AppBuilder {
    config: Config,
    client: OnceLock<reqwest::Client>,
}

impl AppBuilder {
    /// Load the config file, resolve secrets through `vault`, and validate.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be parsed, the vault fails, or a required setting
    /// is missing or invalid.
    pub async fn load(path: &Path, vault: &dyn VaultProvider) -> anyhow::Result<Self> {
        let mut config = Config::load(path)?;
        config.resolve_secrets(vault).await?;
        config.validate().context("configuration is incomplete")?;
        tracing::debug!(
            config = %path.display(),
            collection = %config.qdrant.collection,
            "configuration loaded"
        );
        Ok(Self::from_config(config))
    }

    /// Wrap an already assembled config. No validation is performed.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    /// Use `client` for every component instead of one built from `[http]`.
    #[must_use]
    pub fn with_http_client(self, client: reqwest::Client) -> Self {
        let shared = OnceLock::new();
        let _ = shared.set(client);
        Self {
            config: self.config,
            client: shared,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Client configured from `[http]`. Built on first use and shared by every
    /// component this builder creates.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }
        let client = repoqa_llm::http::build_client(self.config.http.timeouts())
            .context("failed to create HTTP client")?;
        Ok(self.client.get_or_init(|| client).clone())
    }

    /// # Errors
    ///
    /// Fails when no GitHub token was resolved.
    pub fn build_source(&self) -> anyhow::Result<GithubSource> {
        let token = self
            .config
            .secrets
            .github_token
            .as_ref()
            .map(|s| s.expose().to_owned())
            .unwrap_or_default();
        let source = GithubSource::new(token)
            .context("failed to create GitHub source")?
            .with_client(self.http_client()?)
            .with_base_url(&self.config.github.api_url)
            .with_max_response_bytes(self.config.github.max_response_bytes);
        Ok(source)
    }

    /// Chat and embedding provider for the configured OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn build_provider(&self) -> anyhow::Result<OpenAiProvider> {
        let llm = &self.config.llm;
        let api_key = self
            .config
            .secrets
            .openai_api_key
            .as_ref()
            .map(|s| s.expose().to_owned())
            .unwrap_or_default();
        let provider = OpenAiProvider::new(
            api_key,
            llm.base_url.clone(),
            llm.model.clone(),
            llm.max_tokens,
            Some(llm.embedding_model.clone()),
        )
        .with_client(self.http_client()?);
        Ok(match llm.embedding_dimensions {
            Some(dim) => provider.with_dimensions(dim),
            None => provider,
        })
    }

    /// # Errors
    ///
    /// Fails if the Qdrant URL is invalid.
    pub fn build_store(&self) -> anyhow::Result<Arc<dyn VectorStore>> {
        let api_key = self.config.secrets.qdrant_api_key.as_ref().map(|s| s.expose());
        let ops = QdrantOps::new(&self.config.qdrant.url, api_key)
            .with_context(|| format!("failed to connect to Qdrant at {}", self.config.qdrant.url))?;
        Ok(Arc::new(ops))
    }

    /// # Errors
    ///
    /// Fails if any component cannot be constructed.
    pub fn build_indexer(&self) -> anyhow::Result<Indexer<GithubSource, OpenAiProvider>> {
        self.indexer_with(
            self.build_source()?,
            Arc::new(self.build_provider()?),
            self.build_store()?,
        )
    }

    /// Indexer over caller-supplied components, configured from `[index]` and
    /// `[qdrant]`.
    ///
    /// # Errors
    ///
    /// Fails if the chunking settings are invalid.
    pub fn indexer_with<S, P>(
        &self,
        source: S,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
    ) -> anyhow::Result<Indexer<S, P>>
    where
        S: RepositorySource,
        P: LlmProvider,
    {
        Indexer::new(source, provider, store, self.config.indexer_config())
            .context("failed to create indexer")
    }

    /// # Errors
    ///
    /// Fails if any component cannot be constructed.
    pub fn build_flow(&self, scope: Option<RepoRef>) -> anyhow::Result<RetrievalQaFlow> {
        let provider = Arc::new(self.build_provider()?);
        self.flow_with(Arc::clone(&provider), provider, self.build_store()?, scope)
    }

    /// QA flow over caller-supplied providers and store, configured from
    /// `[retrieval]` and `[qdrant]`.
    ///
    /// # Errors
    ///
    /// Fails if the flow graph is invalid.
    pub fn flow_with<E, L>(
        &self,
        embedder: Arc<E>,
        llm: Arc<L>,
        store: Arc<dyn VectorStore>,
        scope: Option<RepoRef>,
    ) -> anyhow::Result<RetrievalQaFlow>
    where
        E: LlmProvider + 'static,
        L: LlmProvider + 'static,
    {
        let retrieval = &self.config.retrieval;
        let mut retriever = Retriever::new(
            embedder,
            store,
            self.config.qdrant.collection.clone(),
            retrieval.top_k,
        );
        if let Some(threshold) = retrieval.score_threshold {
            retriever = retriever.with_score_threshold(threshold);
        }

        let mut node = QaNode::new(retriever, llm).with_system_prompt(&retrieval.system_prompt);
        if let Some(repo) = scope {
            node = node.with_scope(repo);
        }
        RetrievalQaFlow::new(node).context("failed to build QA flow")
    }
}

#[cfg(test)]
mod tests {
    use repoqa_llm::mock::MockProvider;
    use repoqa_memory::InMemoryVectorStore;
    use serial_test::serial;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{GITHUB_TOKEN, OPENAI_API_KEY, QDRANT_API_KEY};
    use crate::vault::{MockVaultProvider, Secret};

    fn vault() -> MockVaultProvider {
        MockVaultProvider::new()
            .with_secret(OPENAI_API_KEY, "sk-test")
            .with_secret(GITHUB_TOKEN, "ghp_test")
            .with_secret(QDRANT_API_KEY, "qd-test")
    }

    #[test]
    #[serial]
    fn explicit_config_path_wins() {
        unsafe { std::env::set_var("REPOQA_CONFIG", "/from/env.toml") };
        assert_eq!(
            resolve_config_path(Some(Path::new("/cli.toml"))),
            PathBuf::from("/cli.toml")
        );
        assert_eq!(resolve_config_path(None), PathBuf::from("/from/env.toml"));
        unsafe { std::env::remove_var("REPOQA_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[tokio::test]
    #[serial]
    async fn load_fails_fast_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppBuilder::load(&dir.path().join("none.toml"), &MockVaultProvider::new())
            .await
            .err()
            .unwrap();
        let msg = format!("{err:#}");
        assert!(msg.contains("configuration is incomplete"));
        assert!(msg.contains(OPENAI_API_KEY));
        assert!(msg.contains(QDRANT_API_KEY));
        assert!(msg.contains("qdrant.url"));
        assert!(msg.contains("qdrant.collection"));
    }

    #[tokio::test]
    #[serial]
    async fn load_with_secrets_builds_components() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repoqa.toml");
        std::fs::write(
            &path,
            "[qdrant]\nurl = \"http://localhost:6334\"\ncollection = \"code\"\n",
        )
        .unwrap();
        let app = AppBuilder::load(&path, &vault()).await.unwrap();
        assert_eq!(app.config().qdrant.collection, "code");

        app.build_source().unwrap();
        assert_eq!(app.build_provider().unwrap().model(), "gpt-4o-mini");
        app.build_indexer().unwrap();
        app.build_flow(None).unwrap();
    }

    #[tokio::test]
    async fn source_and_provider_share_one_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/svc"))
            .and(header("x-repoqa-client", "shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "svc",
                "full_name": "acme/svc",
                "owner": {"login": "acme"},
                "default_branch": "main",
                "clone_url": "https://github.com/acme/svc.git"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("x-repoqa-client", "shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-repoqa-client", "shared".parse().unwrap());
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap();

        let mut config = Config::default();
        config.github.api_url = server.uri();
        config.llm.base_url = server.uri();
        config.secrets.github_token = Some(Secret::new("ghp_test"));
        let app = AppBuilder::from_config(config).with_http_client(client);

        let info = app
            .build_source()
            .unwrap()
            .repository_info("acme", "svc")
            .await
            .unwrap();
        assert_eq!(info.default_branch, "main");
        let answer = app
            .build_provider()
            .unwrap()
            .chat(&[repoqa_llm::Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(answer, "ok");
    }

    #[test]
    fn http_client_is_built_once() {
        let app = AppBuilder::from_config(Config::default());
        assert!(app.client.get().is_none());
        app.http_client().unwrap();
        assert!(app.client.get().is_some());
        app.build_provider().unwrap();
        app.http_client().unwrap();
    }

    #[test]
    fn source_requires_token() {
        let app = AppBuilder::from_config(Config::default());
        assert!(app.build_source().is_err());
    }

    #[test]
    fn indexer_rejects_invalid_chunking() {
        let mut config = Config::default();
        config.index.chunk_overlap = config.index.chunk_size;
        let app = AppBuilder::from_config(config);
        let result = app.indexer_with(
            EmptySource,
            Arc::new(MockProvider::hashed(8)),
            Arc::new(InMemoryVectorStore::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn flow_with_uses_retrieval_settings() {
        let mut config = Config::default();
        config.retrieval.system_prompt = "Answer briefly.".into();
        config.qdrant.collection = "missing".into();
        let app = AppBuilder::from_config(config);

        let llm = Arc::new(MockProvider::default());
        let flow = app
            .flow_with(
                Arc::new(MockProvider::hashed(8)),
                Arc::clone(&llm),
                Arc::new(InMemoryVectorStore::new()),
                None,
            )
            .unwrap();
        // The collection does not exist, so retrieval fails before the model runs.
        assert!(flow.ask("q").await.is_err());
        assert!(llm.prompts().is_empty());
    }

    struct EmptySource;

    impl RepositorySource for EmptySource {
        async fn list_blobs(
            &self,
            _repo: &RepoRef,
        ) -> Result<Vec<repoqa_index::FileEntry>, repoqa_index::SourceError> {
            Ok(Vec::new())
        }

        async fn fetch_file(
            &self,
            _repo: &RepoRef,
            path: &str,
        ) -> Result<repoqa_index::FileContent, repoqa_index::SourceError> {
            Err(repoqa_index::SourceError::NotFound(path.to_owned()))
        }

        async fn repository_info(
            &self,
            owner: &str,
            name: &str,
        ) -> Result<repoqa_index::Repository, repoqa_index::SourceError> {
            Err(repoqa_index::SourceError::NotFound(format!("{owner}/{name}")))
        }
    }
}
