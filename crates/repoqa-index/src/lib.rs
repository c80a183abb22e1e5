//! Repository indexing and semantic retrieval.
//!
//! Indexing lists a repository tree through a [`source::RepositorySource`], keeps
//! source files accepted by the [`filter::FileFilter`], fetches them in rate-limited
//! batches, splits them into overlapping chunks, embeds the chunks and upserts them
//! into a vector collection. Retrieval embeds a question and returns the nearest
//! chunks from the same collection.

pub(crate) mod context;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod indexer;
pub mod retriever;
pub mod source;

pub use error::{IndexError, RetrievalError};
pub use fetcher::{BackoffPolicy, BatchFetcher, FetchConfig, FetchFailure, FetchReport};
pub use filter::{FileFilter, FilterConfig};
pub use indexer::{IndexOutcome, IndexReport, Indexer, IndexerConfig};
pub use retriever::{RetrievedChunk, Retriever, format_as_context};
pub use source::{FileContent, FileEntry, RepoRef, Repository, RepositorySource, SourceError};
