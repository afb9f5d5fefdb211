//! Product embedding index adapter
//!
//! Wraps the Qdrant collection of product embeddings: kNN search with an
//! optional payload filter and MMR diversification, point retrieval by
//! product id, batched payload fetch for recommendation enrichment, and
//! the HTTP embedding client used to vectorize text and image queries.

pub mod embedding;
pub mod mmr;
pub mod store;
pub mod types;

pub use embedding::EmbeddingClient;
pub use store::VectorStore;
pub use types::{
    CollectionSummary, FieldMatch, MatchTarget, SearchHit, SearchRequest, StoredPoint,
};
