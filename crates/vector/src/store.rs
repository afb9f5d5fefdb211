//! Qdrant-backed vector index adapter
//!
//! Product embeddings live in a single collection keyed by numeric
//! `product_id`, with the display payload (title, brand, category, price,
//! image_url) stored alongside each vector. Indexing is owned by an
//! external pipeline; this adapter only searches, retrieves, and embeds
//! queries.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_output::VectorsOptions, Condition, Filter,
    GetPoints, PointId, Range, SearchParams, SearchPoints, Value, VectorsOutput,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use shopgraph_core::config::{EmbeddingConfig, VectorConfig};
use shopgraph_core::error::{Result, ShopGraphError};

use crate::embedding::EmbeddingClient;
use crate::mmr::{self, MmrCandidate};
use crate::types::{CollectionSummary, FieldMatch, MatchTarget, SearchHit, SearchRequest, StoredPoint};

/// Vector store adapter over the product embedding collection
pub struct VectorStore {
    client: Qdrant,
    collection: String,
    embeddings: EmbeddingClient,
}

impl VectorStore {
    /// Build the Qdrant client and embedding client. The connection itself
    /// is lazy; the first call performs it.
    pub fn connect(config: &VectorConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .build()
            .map_err(|e| ShopGraphError::unavailable("vector", e.to_string()))?;

        info!(url = %config.url, collection = %config.collection, "initialized vector store");

        Ok(Self {
            client,
            collection: config.collection.clone(),
            embeddings: EmbeddingClient::new(embedding)?,
        })
    }

    /// k-nearest-neighbor search with optional payload filter and MMR
    /// diversification.
    ///
    /// Plain searches return the index ordering. With `use_mmr` the top
    /// `mmr_candidates` hits (default `10 * limit`) are fetched with their
    /// vectors and re-selected by MMR.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        if request.vector.is_empty() {
            return Err(ShopGraphError::invalid_input(
                "search requires a query vector, text, or image",
            ));
        }
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let fetch_limit = if request.use_mmr {
            request.candidate_pool()
        } else {
            request.limit
        };

        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: request.vector.clone(),
                limit: fetch_limit as u64,
                filter: build_filter(&request.filter),
                score_threshold: request.score_threshold,
                with_payload: Some(true.into()),
                with_vectors: Some(request.use_mmr.into()),
                params: request.hnsw_ef.map(|ef| SearchParams {
                    hnsw_ef: Some(ef),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .map_err(vector_err)?;

        if request.use_mmr {
            let candidates: Vec<MmrCandidate> = response
                .result
                .into_iter()
                .filter_map(|point| {
                    let id = numeric_id(point.id)?;
                    let vector = point_vector(point.vectors)?;
                    Some(MmrCandidate {
                        id,
                        score: point.score,
                        vector,
                        payload: payload_to_json(point.payload),
                    })
                })
                .collect();

            let selected = mmr::select(candidates, request.mmr_diversity, request.limit);
            debug!(selected = selected.len(), "mmr re-selection complete");
            Ok(selected
                .into_iter()
                .map(|c| SearchHit {
                    id: c.id,
                    score: c.score,
                    payload: c.payload,
                })
                .collect())
        } else {
            Ok(response
                .result
                .into_iter()
                .filter_map(|point| {
                    let id = numeric_id(point.id)?;
                    Some(SearchHit {
                        id,
                        score: point.score,
                        payload: payload_to_json(point.payload),
                    })
                })
                .collect())
        }
    }

    /// Fetch stored points by product id. Ids with no stored vector are
    /// silently omitted.
    pub async fn retrieve(&self, ids: &[i64], with_vectors: bool) -> Result<Vec<StoredPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| (*id as u64).into()).collect();
        let response = self
            .client
            .get_points(GetPoints {
                collection_name: self.collection.clone(),
                ids: point_ids,
                with_payload: Some(true.into()),
                with_vectors: Some(with_vectors.into()),
                ..Default::default()
            })
            .await
            .map_err(vector_err)?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = numeric_id(point.id)?;
                Some(StoredPoint {
                    id,
                    vector: point_vector(point.vectors),
                    payload: payload_to_json(point.payload),
                })
            })
            .collect())
    }

    /// Embed a text query into the collection's vector space.
    pub async fn create_text_vector(&self, text: &str) -> Result<Vec<f32>> {
        self.embeddings.embed_text(text).await
    }

    /// Embed an image (by path or URL) into the collection's vector space.
    pub async fn create_image_vector(&self, source: &str) -> Result<Vec<f32>> {
        self.embeddings.embed_image(source).await
    }

    /// Collection name and point count.
    pub async fn collection_info(&self) -> Result<CollectionSummary> {
        let response = self
            .client
            .collection_info(self.collection.clone())
            .await
            .map_err(vector_err)?;
        let info = response.result.ok_or_else(|| {
            ShopGraphError::not_found(format!("collection {}", self.collection))
        })?;
        Ok(CollectionSummary {
            name: self.collection.clone(),
            points_count: info.points_count.unwrap_or(0),
        })
    }

    /// Connectivity probe: server reachable and collection present.
    pub async fn health(&self) -> Result<CollectionSummary> {
        self.client.health_check().await.map_err(vector_err)?;
        self.collection_info().await
    }
}

fn build_filter(matches: &[FieldMatch]) -> Option<Filter> {
    if matches.is_empty() {
        return None;
    }
    let conditions: Vec<Condition> = matches
        .iter()
        .map(|m| match &m.value {
            MatchTarget::Keyword(value) => Condition::matches(m.field.clone(), value.clone()),
            MatchTarget::Integer(value) => Condition::matches(m.field.clone(), *value),
            MatchTarget::Bool(value) => Condition::matches(m.field.clone(), *value),
            // Qdrant has no float equality match; a degenerate range is
            // the equivalent predicate.
            MatchTarget::Float(value) => Condition::range(
                m.field.clone(),
                Range {
                    gte: Some(*value),
                    lte: Some(*value),
                    ..Default::default()
                },
            ),
        })
        .collect();
    Some(Filter::must(conditions))
}

fn numeric_id(id: Option<PointId>) -> Option<i64> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(n as i64),
        PointIdOptions::Uuid(_) => None,
    }
}

fn point_vector(vectors: Option<VectorsOutput>) -> Option<Vec<f32>> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(vector) => Some(vector.data),
        _ => None,
    }
}

fn payload_to_json(payload: HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, value_to_json(value)))
            .collect(),
    )
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => serde_json::Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}

fn vector_err(error: qdrant_client::QdrantError) -> ShopGraphError {
    ShopGraphError::backend("vector", error.to_string())
}
