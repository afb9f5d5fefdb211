//! Recommendation request and response types

use serde::{Deserialize, Serialize};

use shopgraph_graph::PurchaseCheck;

/// User activity phase driving source composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMode {
    /// Exploring; semantic similarity with high diversity
    Browsing,
    /// Just bought something; complementary products
    PostPurchase,
    /// No history; trending and popular items
    ColdStart,
}

/// Which component produced a recommendation item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Behavioral,
    Trending,
    SemanticSimilar,
    Complementary,
    Hybrid,
}

/// One recommended product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedItem {
    pub product_id: i64,
    pub score: f64,
    pub source: RecommendationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Context captured during mode classification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModeContext {
    PostPurchase(PurchaseCheck),
    Browsing { recent_interactions: usize },
}

/// Recommendation request; absent weights fall back to the configured
/// defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: i64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub behavioral_weight: Option<f64>,
    #[serde(default)]
    pub trending_weight: Option<f64>,
    #[serde(default)]
    pub activity_weight: Option<f64>,
    #[serde(default)]
    pub mmr_diversity: Option<f32>,
    #[serde(default = "default_true")]
    pub include_reasons: bool,
}

impl RecommendationRequest {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id,
            limit: default_limit(),
            behavioral_weight: None,
            trending_weight: None,
            activity_weight: None,
            mmr_diversity: None,
            include_reasons: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

fn default_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

/// Full recommendation response
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub user_id: i64,
    pub mode: RecommendationMode,
    pub mode_context: Option<ModeContext>,
    pub total_count: usize,
    pub sources_used: Vec<RecommendationSource>,
    pub strategy: String,
    pub recommendations: Vec<RecommendedItem>,
}

/// Paginated "For You" response
#[derive(Debug, Clone, Serialize)]
pub struct ForYouResponse {
    pub user_id: i64,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
    pub mode: RecommendationMode,
    pub strategy: String,
    pub recommendations: Vec<RecommendedItem>,
}

/// Mode probe response
#[derive(Debug, Clone, Serialize)]
pub struct UserModeResponse {
    pub mode: RecommendationMode,
    pub context: Option<ModeContext>,
    pub strategy: String,
}

/// Per-source item budget derived from the request weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub behavioral: usize,
    pub trending: usize,
    pub activity: usize,
}

impl Budget {
    /// Floor-allocate the behavioral and trending shares; the activity
    /// share absorbs the rounding residue so the three always sum to
    /// `total`.
    pub fn allocate(total: usize, behavioral: f64, trending: f64, activity: f64) -> Self {
        let sum = behavioral + trending + activity;
        if sum <= 0.0 || total == 0 {
            return Self {
                behavioral: 0,
                trending: 0,
                activity: total,
            };
        }
        let behavioral_limit = ((behavioral / sum) * total as f64) as usize;
        let trending_limit = ((trending / sum) * total as f64) as usize;
        Self {
            behavioral: behavioral_limit,
            trending: trending_limit,
            activity: total - behavioral_limit - trending_limit,
        }
    }
}
