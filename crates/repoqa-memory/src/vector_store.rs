use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("collection {collection} holds {actual}-dimensional vectors, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: u64,
        actual: u64,
    },
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Exact-match payload conditions, all of which must hold.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn must_match(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>>;

    /// Vector dimension of `collection`, or `None` if it does not exist.
    fn vector_size(&self, collection: &str) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>>;

    fn create_collection(
        &self,
        collection: &str,
        vector_size: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Create the collection unless it already exists. An existing collection is
    /// reused only when its vector dimension equals `vector_size`.
    ///
    /// # Errors
    ///
    /// [`VectorStoreError::DimensionMismatch`] if the existing collection has a
    /// different dimension.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if let Some(actual) = self.vector_size(&collection).await? {
                if actual != vector_size {
                    return Err(VectorStoreError::DimensionMismatch {
                        collection,
                        expected: vector_size,
                        actual,
                    });
                }
                return Ok(());
            }
            tracing::info!(collection, vector_size, ?distance, "creating collection");
            self.create_collection(&collection, vector_size, distance)
                .await
        })
    }

    /// Insert points, overwriting any existing point with the same id.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>>;

    /// Nearest neighbours of `vector`, best first, at most `limit` of them.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>>;
}
