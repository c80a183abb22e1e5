//! Repository indexing orchestrator: list → filter → fetch → chunk → embed → store.

use std::collections::HashMap;
use std::sync::Arc;

use repoqa_llm::LlmError;
use repoqa_llm::provider::LlmProvider;
use repoqa_memory::document::{Chunk, Document, DocumentMetadata, SplitterConfig, TextSplitter};
use repoqa_memory::{Distance, VectorPoint, VectorStore};

use crate::context::contextualize_for_embedding;
use crate::error::IndexError;
use crate::fetcher::{BatchFetcher, FetchConfig, FetchFailure};
use crate::filter::{FileFilter, FilterConfig, content_type};
use crate::source::{FileContent, RepoRef, RepositorySource};

const POINT_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x72, 0x65, 0x70, 0x6f, // "repo"
    0x71, 0x61, 0x2d, 0x63, // "qa-c"
    0x68, 0x75, 0x6e, 0x6b, // "hunk"
    0x2d, 0x69, 0x64, 0x73, // "-ids"
]);

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub filter: FilterConfig,
    pub fetch: FetchConfig,
    pub splitter: SplitterConfig,
    pub collection: String,
    /// Dimension every embedding must have; used when creating the collection.
    pub vector_size: u64,
    pub distance: Distance,
    /// Number of chunks sent per embedding request.
    pub embed_batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            fetch: FetchConfig::default(),
            splitter: SplitterConfig::default(),
            collection: "repoqa_code".into(),
            vector_size: 1536,
            distance: Distance::Cosine,
            embed_batch_size: 64,
        }
    }
}

/// How an indexing run ended.
///
/// Every variant other than `Indexed` is an early, successful no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    EmptyRepository,
    NoSupportedFiles,
    NothingFetched,
    Indexed,
}

/// Summary of an indexing run.
#[derive(Debug)]
pub struct IndexReport {
    pub repo: RepoRef,
    pub outcome: IndexOutcome,
    pub files_listed: usize,
    pub files_selected: usize,
    pub files_fetched: usize,
    pub documents: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<FetchFailure>,
    pub duration_ms: u64,
}

impl IndexReport {
    fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            outcome: IndexOutcome::Indexed,
            files_listed: 0,
            files_selected: 0,
            files_fetched: 0,
            documents: 0,
            chunks_indexed: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Deterministic point id, so that re-indexing the same chunk overwrites it.
#[must_use]
pub fn point_id(repo: &RepoRef, source: &str, chunk_index: usize) -> String {
    let key = format!("{repo}\n{source}\n{chunk_index}");
    uuid::Uuid::new_v5(&POINT_NAMESPACE, key.as_bytes()).to_string()
}

fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn materialize(files: &[FileContent]) -> Vec<Document> {
    files
        .iter()
        .filter(|f| !f.content.trim().is_empty())
        .map(|f| Document {
            content: f.content.clone(),
            metadata: DocumentMetadata::new(&f.path, content_type(&f.path)),
        })
        .collect()
}

fn chunk_to_point(repo: &RepoRef, chunk: Chunk, vector: Vec<f32>) -> VectorPoint {
    let id = point_id(repo, &chunk.metadata.source, chunk.chunk_index);
    let mut payload = HashMap::new();
    payload.insert("content_hash".into(), content_hash(&chunk.content).into());
    payload.insert("content".into(), chunk.content.into());
    payload.insert("source".into(), chunk.metadata.source.into());
    payload.insert("language".into(), chunk.metadata.content_type.into());
    payload.insert("chunk_index".into(), chunk.chunk_index.into());
    payload.insert("start_offset".into(), chunk.start_offset.into());
    payload.insert("owner".into(), repo.owner.clone().into());
    payload.insert("repo".into(), repo.name.clone().into());
    payload.insert("branch".into(), repo.branch.clone().into());
    VectorPoint {
        id,
        vector,
        payload,
    }
}

/// Indexes one repository branch into a vector collection.
pub struct Indexer<S, P> {
    source: S,
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    filter: FileFilter,
    splitter: TextSplitter,
    config: IndexerConfig,
}

impl<S: RepositorySource, P: LlmProvider> Indexer<S, P> {
    /// # Errors
    ///
    /// Returns [`IndexError::Chunking`] if the splitter configuration is invalid.
    pub fn new(
        source: S,
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        let splitter = TextSplitter::new(config.splitter)?;
        Ok(Self {
            source,
            provider,
            store,
            filter: FileFilter::new(&config.filter),
            splitter,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run the full pipeline for `repo`.
    ///
    /// Files that cannot be fetched are skipped and listed in the report. An empty
    /// repository, no supported files, or nothing fetched end the run early with
    /// the matching [`IndexOutcome`] and zero chunks indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing, collection provisioning, embedding or the upsert
    /// fails. Re-running after a failure is safe.
    pub async fn index(&self, repo: &RepoRef) -> Result<IndexReport, IndexError> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::new(repo.clone());
        tracing::info!(%repo, collection = %self.config.collection, "indexing started");

        let entries = self
            .source
            .list_blobs(repo)
            .await
            .map_err(|source| IndexError::Enumerate {
                repo: repo.clone(),
                source,
            })?;
        report.files_listed = entries.len();
        if entries.is_empty() {
            return Ok(finish(report, start, IndexOutcome::EmptyRepository));
        }

        let selected = self.filter.select(&entries);
        report.files_selected = selected.len();
        tracing::info!(%repo, listed = entries.len(), selected = selected.len(), "filtered tree");
        if selected.is_empty() {
            return Ok(finish(report, start, IndexOutcome::NoSupportedFiles));
        }

        let fetched = BatchFetcher::new(&self.source, self.config.fetch)
            .fetch_all(repo, &selected)
            .await;
        report.files_fetched = fetched.files.len();
        report.failures = fetched.failures;

        let documents = materialize(&fetched.files);
        report.documents = documents.len();
        if documents.is_empty() {
            return Ok(finish(report, start, IndexOutcome::NothingFetched));
        }

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|d| self.splitter.split(d))
            .collect();
        tracing::info!(%repo, documents = documents.len(), chunks = chunks.len(), "chunked documents");

        self.store
            .ensure_collection(
                &self.config.collection,
                self.config.vector_size,
                self.config.distance,
            )
            .await
            .map_err(|source| IndexError::Provision {
                repo: repo.clone(),
                collection: self.config.collection.clone(),
                source,
            })?;

        let points = self.embed_chunks(repo, chunks).await?;
        let count = points.len();

        self.store
            .upsert(&self.config.collection, points)
            .await
            .map_err(|source| IndexError::Upsert {
                repo: repo.clone(),
                collection: self.config.collection.clone(),
                source,
            })?;

        report.chunks_indexed = count;
        let report = finish(report, start, IndexOutcome::Indexed);
        tracing::info!(
            %repo,
            chunks = report.chunks_indexed,
            skipped = report.failures.len(),
            duration_ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }

    async fn embed_chunks(
        &self,
        repo: &RepoRef,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<VectorPoint>, IndexError> {
        let batch_size = self.config.embed_batch_size.max(1);
        let mut points = Vec::with_capacity(chunks.len());
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
            let texts: Vec<String> = batch.iter().map(contextualize_for_embedding).collect();

            let vectors = self
                .provider
                .embed_batch(&texts)
                .await
                .map_err(|source| IndexError::Embed {
                    repo: repo.clone(),
                    source,
                })?;
            if vectors.len() != texts.len() {
                return Err(IndexError::Embed {
                    repo: repo.clone(),
                    source: LlmError::Other(format!(
                        "{} returned {} embeddings for {} texts",
                        self.provider.name(),
                        vectors.len(),
                        texts.len()
                    )),
                });
            }

            for (chunk, vector) in batch.into_iter().zip(vectors) {
                if vector.len() as u64 != self.config.vector_size {
                    return Err(IndexError::DimensionMismatch {
                        repo: repo.clone(),
                        expected: self.config.vector_size,
                        actual: vector.len(),
                    });
                }
                points.push(chunk_to_point(repo, chunk, vector));
            }
            tracing::debug!(%repo, embedded = points.len(), "embedded batch");
        }

        Ok(points)
    }
}

fn finish(mut report: IndexReport, start: std::time::Instant, outcome: IndexOutcome) -> IndexReport {
    report.outcome = outcome;
    report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    if outcome != IndexOutcome::Indexed {
        tracing::info!(repo = %report.repo, ?outcome, "nothing to index");
    }
    report
}
