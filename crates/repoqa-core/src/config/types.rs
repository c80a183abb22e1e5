use std::time::Duration;

use repoqa_index::{BackoffPolicy, FetchConfig, FilterConfig, IndexerConfig};
use repoqa_llm::http::HttpTimeouts;
use repoqa_memory::Distance;
use repoqa_memory::document::SplitterConfig;
use serde::{Deserialize, Serialize};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_max_response_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Largest response body accepted from the contents API.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Requested embedding dimension for models that support shortening.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            embedding_dimensions: None,
        }
    }
}

fn default_vector_size() -> u64 {
    1536
}

/// Endpoint and collection have no built-in value: they must come from the
/// config file or the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QdrantConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: u64,
    #[serde(default)]
    pub distance: Distance,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            collection: String::new(),
            vector_size: default_vector_size(),
            distance: Distance::default(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_embed_batch_size() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Files fetched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions about a source code repository. \
Base the answer on the code context provided with the question and cite file paths. \
If the context does not contain the answer, say so.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: None,
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Timeouts for the client shared by the GitHub and LLM backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts::from_secs(self.connect_timeout_secs, self.request_timeout_secs)
    }
}

/// Credentials resolved through a [`crate::vault::VaultProvider`], never read from
/// or written to the config file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
    pub github_token: Option<Secret>,
    pub qdrant_api_key: Option<Secret>,
}

impl Config {
    /// Indexer settings derived from the `[index]` and `[qdrant]` sections.
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        let index = &self.index;
        IndexerConfig {
            filter: index.filter.clone(),
            fetch: FetchConfig {
                batch_size: index.batch_size,
                batch_pause: Duration::from_millis(index.batch_pause_ms),
                backoff: BackoffPolicy {
                    max_attempts: index.max_attempts,
                    min_delay: Duration::from_millis(index.min_backoff_ms),
                    max_delay: Duration::from_millis(index.max_backoff_ms),
                },
            },
            splitter: SplitterConfig {
                chunk_size: index.chunk_size,
                chunk_overlap: index.chunk_overlap,
            },
            collection: self.qdrant.collection.clone(),
            vector_size: self.qdrant.vector_size,
            distance: self.qdrant.distance,
            embed_batch_size: index.embed_batch_size,
        }
    }
}
