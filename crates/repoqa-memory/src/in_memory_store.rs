use std::collections::HashMap;
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, Distance, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    vector_size: u64,
    distance: Distance,
    points: HashMap<String, StoredPoint>,
}

/// Process-local vector store used by tests and dry runs.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Payloads of every stored point in `collection`, keyed by point id.
    #[must_use]
    pub fn payloads(&self, collection: &str) -> HashMap<String, HashMap<String, serde_json::Value>> {
        self.collections
            .read()
            .ok()
            .and_then(|cols| {
                cols.get(collection).map(|col| {
                    col.points
                        .iter()
                        .map(|(id, p)| (id.clone(), p.payload.clone()))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        // Negated so that "higher is better" holds for every metric.
        Distance::Euclid => -a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    filter.must.iter().all(|cond| {
        payload
            .get(&cond.field)
            .and_then(serde_json::Value::as_str)
            == Some(cond.value.as_str())
    })
}

impl VectorStore for InMemoryVectorStore {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn vector_size(&self, collection: &str) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.get(&collection).map(|col| col.vector_size))
        })
    }

    fn create_collection(
        &self,
        collection: &str,
        vector_size: u64,
        distance: Distance,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            if cols.contains_key(&collection) {
                return Err(VectorStoreError::Collection(format!(
                    "collection {collection} already exists"
                )));
            }
            cols.insert(
                collection,
                InMemoryCollection {
                    vector_size,
                    distance,
                    points: HashMap::new(),
                },
            );
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            if let Some(bad) = points
                .iter()
                .find(|p| p.vector.len() as u64 != col.vector_size)
            {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has dimension {}, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    col.vector_size
                )));
            }
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let filter = filter.unwrap_or_default();

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &filter))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: score(col.distance, &vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            #[expect(clippy::cast_possible_truncation)]
            scored.truncate(limit as usize);
            Ok(scored)
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Collection(format!("collection {collection} not found"))
            })?;
            Ok(col.points.len() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, repo: &str) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("repo".to_owned(), serde_json::json!(repo));
        VectorPoint {
            id: id.to_owned(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("c").await.unwrap());
        store.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        store.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_other_dimension() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 3, Distance::Cosine).await.unwrap();
        assert_eq!(store.vector_size("c").await.unwrap(), Some(3));
        assert_eq!(store.vector_size("missing").await.unwrap(), None);

        let err = store
            .ensure_collection("c", 8, Distance::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch { expected: 8, actual: 3, .. }
        ));
    }

    #[tokio::test]
    async fn create_existing_collection_fails() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2, Distance::Cosine).await.unwrap();
        assert!(store.create_collection("c", 2, Distance::Cosine).await.is_err());
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        store.upsert("c", vec![point("a", vec![1.0, 0.0], "x")]).await.unwrap();
        store.upsert("c", vec![point("a", vec![0.0, 1.0], "y")]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        assert_eq!(store.payloads("c")["a"]["repo"], "y");
    }

    #[tokio::test]
    async fn upsert_into_missing_collection_fails() {
        let store = InMemoryVectorStore::new();
        let err = store
            .upsert("missing", vec![point("a", vec![1.0], "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3, Distance::Cosine).await.unwrap();
        let err = store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "x")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension 2"));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_limits() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0], "x"),
                    point("near", vec![1.0, 0.1], "x"),
                    point("mid", vec![1.0, 1.0], "x"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", vec![1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn search_applies_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2, Distance::Dot).await.unwrap();
        store
            .upsert(
                "c",
                vec![point("a", vec![1.0, 0.0], "x"), point("b", vec![1.0, 0.0], "y")],
            )
            .await
            .unwrap();
        let filter = VectorFilter::default().must_match("repo", "y");
        let hits = store.search("c", vec![1.0, 0.0], 10, Some(filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn search_missing_collection_fails() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("nope", vec![1.0], 1, None).await.is_err());
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn euclid_prefers_closer_points() {
        let q = [0.0, 0.0];
        assert!(score(Distance::Euclid, &q, &[1.0, 0.0]) > score(Distance::Euclid, &q, &[3.0, 0.0]));
    }
}
