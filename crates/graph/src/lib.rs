//! Behavioral interaction graph adapter
//!
//! Stores timestamped user-product interaction edges in PostgreSQL and
//! answers the fixed traversal query set behind the recommendation
//! platform: collaborative filtering, item-item co-occurrence,
//! co-purchase, trending, per-user and per-product statistics, and
//! candidate re-ranking.

pub mod store;
pub mod types;

pub use store::InteractionStore;
pub use types::{
    AffinityRank, AlsoViewed, CollaborativeHit, ComplementaryHit, CoPurchase, GraphStats,
    HistoryEntry, Interaction, PopularityRank, ProductStats, PurchaseCheck, RecentProduct,
    SimilarProduct, SimilarUser, TrendingProduct,
};
