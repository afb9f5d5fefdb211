//! Recommendation orchestrator
//!
//! Combines the behavioral graph and the vector index into personalized,
//! mode-aware recommendations: exploring users get diversity-heavy
//! semantic similarity, recent buyers get complementary products, and new
//! users get trending items, with behavioral and trending sources always
//! in the mix.

pub mod engine;
pub mod sources;
pub mod types;

pub use engine::{dedup_best, Orchestrator};
pub use sources::{BehaviorQueries, SimilaritySearch};
pub use types::{
    Budget, ForYouResponse, ModeContext, RecommendationMode, RecommendationRequest,
    RecommendationResponse, RecommendationSource, RecommendedItem, UserModeResponse,
};
