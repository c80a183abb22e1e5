//! Semantic retrieval of indexed chunks.

use std::fmt::Write;
use std::sync::Arc;

use repoqa_llm::provider::LlmProvider;
use repoqa_memory::{ScoredVectorPoint, VectorFilter, VectorStore};

use crate::error::RetrievalError;
use crate::source::RepoRef;

/// A chunk returned by similarity search, best matches first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub source: String,
    pub content: String,
    pub chunk_index: usize,
    pub score: f32,
}

impl RetrievedChunk {
    fn from_point(point: ScoredVectorPoint) -> Option<Self> {
        let text = |key: &str| {
            point
                .payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        Some(Self {
            source: text("source")?,
            content: text("content")?,
            chunk_index: point
                .payload
                .get("chunk_index")
                .and_then(serde_json::Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(0),
            score: point.score,
        })
    }
}

pub struct Retriever<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
    score_threshold: Option<f32>,
}

impl<P: LlmProvider> Retriever<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            provider,
            store,
            collection: collection.into(),
            top_k,
            score_threshold: None,
        }
    }

    /// Drop hits scoring below `threshold`.
    #[must_use]
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` chunks most similar to `query`, optionally restricted to one
    /// repository branch.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or the similarity search fails.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: Option<&RepoRef>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if self.top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(query).await?;
        let filter = scope.map(|r| {
            VectorFilter::default()
                .must_match("owner", &r.owner)
                .must_match("repo", &r.name)
                .must_match("branch", &r.branch)
        });

        let hits = self
            .store
            .search(&self.collection, vector, self.top_k as u64, filter)
            .await?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|h| self.score_threshold.is_none_or(|t| h.score >= t))
            .filter_map(RetrievedChunk::from_point)
            .collect();
        tracing::debug!(hits = chunks.len(), collection = %self.collection, "retrieved chunks");
        Ok(chunks)
    }
}

/// Format retrieved chunks as XML for injection into a prompt.
#[must_use]
pub fn format_as_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for chunk in chunks {
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" index=\"{}\" score=\"{:.2}\">",
            chunk.source, chunk.chunk_index, chunk.score,
        );
        out.push_str(&chunk.content);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}
