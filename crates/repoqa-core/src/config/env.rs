use super::Config;

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let parsed = raw.trim().parse::<T>().ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {key} value: {raw}");
    }
    parsed
}

/// Prefixed variable first, then the conventional unprefixed name.
fn env_or_plain(key: &str, plain: &str) -> Option<String> {
    std::env::var(key).or_else(|_| std::env::var(plain)).ok()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(v) = env_or_plain("REPOQA_QDRANT_URL", "QDRANT_URL") {
            self.qdrant.url = v;
        }
        if let Some(v) = env_or_plain("REPOQA_QDRANT_COLLECTION", "QDRANT_COLLECTION_NAME") {
            self.qdrant.collection = v;
        }
        if let Some(size) = parse_env("REPOQA_QDRANT_VECTOR_SIZE") {
            self.qdrant.vector_size = size;
        }
        if let Some(size) = parse_env("REPOQA_INDEX_CHUNK_SIZE") {
            self.index.chunk_size = size;
        }
        if let Some(overlap) = parse_env("REPOQA_INDEX_CHUNK_OVERLAP") {
            self.index.chunk_overlap = overlap;
        }
        if let Some(n) = parse_env("REPOQA_INDEX_BATCH_SIZE") {
            self.index.batch_size = n;
        }
        if let Some(bytes) = parse_env("REPOQA_INDEX_MAX_FILE_SIZE") {
            self.index.filter.max_file_size = bytes;
        }
        if let Ok(v) = std::env::var("REPOQA_INDEX_EXTENSIONS") {
            self.index.filter.extensions = v
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(k) = parse_env("REPOQA_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = k;
        }
        if let Some(threshold) = parse_env::<f32>("REPOQA_RETRIEVAL_SCORE_THRESHOLD") {
            self.retrieval.score_threshold = Some(threshold);
        }
        if let Some(secs) = parse_env("REPOQA_HTTP_REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = secs;
        }
    }
}
