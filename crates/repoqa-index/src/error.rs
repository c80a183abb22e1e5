//! Error types for repoqa-index.

use repoqa_llm::LlmError;
use repoqa_memory::VectorStoreError;
use repoqa_memory::document::DocumentError;

use crate::source::{RepoRef, SourceError};

/// Failures that abort an indexing run.
///
/// Each message names the repository and the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("indexing {repo} failed at list step: cannot enumerate repository: {source}")]
    Enumerate {
        repo: RepoRef,
        #[source]
        source: SourceError,
    },

    #[error("indexing {repo} failed at provision step for collection {collection}: {source}")]
    Provision {
        repo: RepoRef,
        collection: String,
        #[source]
        source: VectorStoreError,
    },

    #[error("indexing {repo} failed at embed step: {source}")]
    Embed {
        repo: RepoRef,
        #[source]
        source: LlmError,
    },

    #[error(
        "indexing {repo} failed at embed step: embedding dimension {actual} does not match collection dimension {expected}"
    )]
    DimensionMismatch {
        repo: RepoRef,
        expected: u64,
        actual: usize,
    },

    #[error("indexing {repo} failed at upsert step into collection {collection}: {source}")]
    Upsert {
        repo: RepoRef,
        collection: String,
        #[source]
        source: VectorStoreError,
    },

    #[error("invalid chunking configuration: {0}")]
    Chunking(#[from] DocumentError),
}

impl IndexError {
    /// Name of the pipeline step that failed.
    #[must_use]
    pub fn step(&self) -> &'static str {
        match self {
            Self::Enumerate { .. } => "list",
            Self::Provision { .. } => "provision",
            Self::Embed { .. } | Self::DimensionMismatch { .. } => "embed",
            Self::Upsert { .. } => "upsert",
            Self::Chunking(_) => "configure",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("failed to embed question: {0}")]
    Embed(#[from] LlmError),

    #[error("similarity search failed: {0}")]
    Search(#[from] VectorStoreError),
}
