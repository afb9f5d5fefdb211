//! Store seams used by the orchestrator
//!
//! The engine depends on these traits rather than the concrete adapters
//! so recommendation policy can be tested against stub stores.

use async_trait::async_trait;

use shopgraph_core::error::Result;
use shopgraph_core::events::EventType;
use shopgraph_graph::{
    CollaborativeHit, ComplementaryHit, GraphStats, HistoryEntry, InteractionStore, PurchaseCheck,
    RecentProduct, TrendingProduct,
};
use shopgraph_vector::{CollectionSummary, SearchHit, SearchRequest, StoredPoint, VectorStore};

/// Graph queries the orchestrator composes over
#[async_trait]
pub trait BehaviorQueries: Send + Sync {
    async fn collaborative(
        &self,
        user_id: i64,
        limit: i64,
        min_shared: i64,
    ) -> Result<Vec<CollaborativeHit>>;

    async fn trending(
        &self,
        limit: i64,
        event_types: Option<&[EventType]>,
    ) -> Result<Vec<TrendingProduct>>;

    async fn user_history(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>>;

    async fn recent_viewed(&self, user_id: i64, limit: i64) -> Result<Vec<RecentProduct>>;

    async fn has_recent_purchase(&self, user_id: i64, lookback_hours: i64)
        -> Result<PurchaseCheck>;

    async fn complementary(&self, product_id: i64, limit: i64) -> Result<Vec<ComplementaryHit>>;

    async fn purchase_history(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>>;

    async fn stats(&self) -> Result<GraphStats>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl BehaviorQueries for InteractionStore {
    async fn collaborative(
        &self,
        user_id: i64,
        limit: i64,
        min_shared: i64,
    ) -> Result<Vec<CollaborativeHit>> {
        InteractionStore::collaborative(self, user_id, limit, min_shared).await
    }

    async fn trending(
        &self,
        limit: i64,
        event_types: Option<&[EventType]>,
    ) -> Result<Vec<TrendingProduct>> {
        InteractionStore::trending(self, limit, event_types).await
    }

    async fn user_history(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>> {
        InteractionStore::user_history(self, user_id, limit, None).await
    }

    async fn recent_viewed(&self, user_id: i64, limit: i64) -> Result<Vec<RecentProduct>> {
        InteractionStore::recent_viewed(self, user_id, limit).await
    }

    async fn has_recent_purchase(
        &self,
        user_id: i64,
        lookback_hours: i64,
    ) -> Result<PurchaseCheck> {
        InteractionStore::has_recent_purchase(self, user_id, lookback_hours).await
    }

    async fn complementary(&self, product_id: i64, limit: i64) -> Result<Vec<ComplementaryHit>> {
        InteractionStore::complementary(self, product_id, limit).await
    }

    async fn purchase_history(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>> {
        InteractionStore::purchase_history(self, user_id, limit).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        InteractionStore::stats(self).await
    }

    async fn ping(&self) -> Result<()> {
        InteractionStore::ping(self).await
    }
}

/// Vector index operations the orchestrator composes over
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>>;

    async fn retrieve(&self, ids: &[i64], with_vectors: bool) -> Result<Vec<StoredPoint>>;

    async fn collection_health(&self) -> Result<CollectionSummary>;
}

#[async_trait]
impl SimilaritySearch for VectorStore {
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        VectorStore::search(self, request).await
    }

    async fn retrieve(&self, ids: &[i64], with_vectors: bool) -> Result<Vec<StoredPoint>> {
        VectorStore::retrieve(self, ids, with_vectors).await
    }

    async fn collection_health(&self) -> Result<CollectionSummary> {
        VectorStore::health(self).await
    }
}
