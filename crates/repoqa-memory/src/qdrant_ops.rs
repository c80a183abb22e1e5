//! Qdrant-backed [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CollectionInfo, Condition, CountPointsBuilder, CreateCollectionBuilder, Filter, PointStruct,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
    vectors_config,
};

use crate::vector_store::{
    BoxFuture, Distance, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Most points sent in a single upsert request.
pub const UPSERT_BATCH_SIZE: usize = 256;

/// Thin wrapper over [`Qdrant`] client encapsulating the collection operations indexing needs.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, api_key: Option<&str>) -> QdrantResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_owned());
        }
        let client = builder.build().map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Access the underlying Qdrant client for advanced operations.
    #[must_use]
    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    async fn create(&self, collection: &str, vector_size: u64, distance: Distance) -> QdrantResult<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, to_qdrant_distance(distance))),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// Convert a JSON payload map to a Qdrant payload map.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if deserialization fails.
    pub fn json_to_payload(
        payload: HashMap<String, serde_json::Value>,
    ) -> Result<HashMap<String, qdrant_client::qdrant::Value>, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
    }
}

fn to_qdrant_distance(distance: Distance) -> qdrant_client::qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant_client::qdrant::Distance::Cosine,
        Distance::Dot => qdrant_client::qdrant::Distance::Dot,
        Distance::Euclid => qdrant_client::qdrant::Distance::Euclid,
    }
}

fn into_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(size).collect());
    }
    batches
}

/// Dimension of the collection's unnamed vector. Named-vector collections have none.
fn unnamed_vector_size(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        vectors_config::Config::Params(params) => Some(params.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

fn to_qdrant_filter(filter: VectorFilter) -> Filter {
    Filter::must(
        filter
            .must
            .into_iter()
            .map(|c| Condition::matches(c.field, c.value))
            .collect::<Vec<_>>(),
    )
}

impl VectorStore for QdrantOps {
    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn vector_size(&self, collection: &str) -> BoxFuture<'_, Result<Option<u64>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if !self.collection_exists(&collection).await? {
                return Ok(None);
            }
            let response = self
                .client
                .collection_info(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            response
                .result
                .as_ref()
                .and_then(unnamed_vector_size)
                .map(Some)
                .ok_or_else(|| {
                    VectorStoreError::Collection(format!(
                        "collection {collection} has no single unnamed vector"
                    ))
                })
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
            self.create(&collection, vector_size, distance)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_points = points
                .into_iter()
                .map(|p| {
                    let payload = Self::json_to_payload(p.payload)
                        .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                    Ok(PointStruct::new(p.id, p.vector, payload))
                })
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            for batch in into_batches(qdrant_points, UPSERT_BATCH_SIZE) {
                let len = batch.len();
                self.client
                    .upsert_points(UpsertPointsBuilder::new(&collection, batch).wait(true))
                    .await
                    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
                tracing::debug!(collection, points = len, "upserted batch");
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
            let results = self
                .search_points(&collection, vector, limit, filter.map(to_qdrant_filter))
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&collection).exact(true))
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(response.result.map_or(0, |r| r.count))
        })
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_url() {
        assert!(QdrantOps::new("http://localhost:6334", None).is_ok());
        assert!(QdrantOps::new("http://localhost:6334", Some("key")).is_ok());
    }

    #[test]
    fn new_invalid_url() {
        assert!(QdrantOps::new("not a valid url", None).is_err());
    }

    #[test]
    fn debug_hides_client() {
        let ops = QdrantOps::new("http://localhost:6334", Some("secret")).unwrap();
        let dbg = format!("{ops:?}");
        assert!(dbg.contains("QdrantOps"));
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn json_to_payload_keeps_fields() {
        let mut payload = HashMap::new();
        payload.insert("source".to_owned(), serde_json::json!("src/auth.py"));
        payload.insert("chunk_index".to_owned(), serde_json::json!(3));
        let converted = QdrantOps::json_to_payload(payload).unwrap();
        assert_eq!(converted.len(), 2);
        assert!(converted.contains_key("chunk_index"));
        assert!(matches!(
            converted["source"].kind,
            Some(Kind::StringValue(ref s)) if s == "src/auth.py"
        ));
    }

    #[test]
    fn distance_mapping() {
        assert_eq!(
            to_qdrant_distance(Distance::Cosine),
            qdrant_client::qdrant::Distance::Cosine
        );
        assert_eq!(
            to_qdrant_distance(Distance::Euclid),
            qdrant_client::qdrant::Distance::Euclid
        );
    }

    #[test]
    fn upsert_batches_are_bounded() {
        let sizes: Vec<usize> = into_batches((0..600).collect::<Vec<_>>(), UPSERT_BATCH_SIZE)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![256, 256, 88]);
        assert!(into_batches(Vec::<u8>::new(), UPSERT_BATCH_SIZE).is_empty());
    }

    #[test]
    fn upsert_batches_keep_order() {
        let batches = into_batches(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn unnamed_vector_size_read_from_collection_info() {
        use qdrant_client::qdrant::{
            CollectionConfig, CollectionParams, VectorParams, VectorParamsMap, VectorsConfig,
        };

        let info = |config: vectors_config::Config| CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(config),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let single = info(vectors_config::Config::Params(VectorParams {
            size: 1536,
            ..Default::default()
        }));
        assert_eq!(unnamed_vector_size(&single), Some(1536));

        let named = info(vectors_config::Config::ParamsMap(VectorParamsMap::default()));
        assert_eq!(unnamed_vector_size(&named), None);
        assert_eq!(unnamed_vector_size(&CollectionInfo::default()), None);
    }

    #[test]
    fn filter_conversion_has_one_condition_per_field() {
        let filter = VectorFilter::default()
            .must_match("owner", "acme")
            .must_match("repo", "svc");
        assert_eq!(to_qdrant_filter(filter).must.len(), 2);
    }

    #[test]
    fn scored_point_payload_converted() {
        let mut payload = HashMap::new();
        payload.insert(
            "content".to_owned(),
            qdrant_client::qdrant::Value::from("def verify(): ..."),
        );
        let point = ScoredPoint {
            id: Some(qdrant_client::qdrant::PointId::from("abc".to_owned())),
            payload,
            score: 0.9,
            ..Default::default()
        };
        let converted = scored_point_to_vector(point);
        assert_eq!(converted.id, "abc");
        assert_eq!(converted.payload["content"], "def verify(): ...");
    }
}
