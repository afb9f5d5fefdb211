//! Row types returned by the interaction graph queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopgraph_core::events::{truncate_to_second, EventType};

/// A single user-product interaction to record.
///
/// Interactions are append-only history; recording the same user-product
/// pair again creates another edge rather than updating the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub product_id: i64,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    /// None when the session is unknown
    pub session_id: Option<String>,
}

impl Interaction {
    pub fn new(
        user_id: i64,
        product_id: i64,
        event_type: EventType,
        event_time: DateTime<Utc>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            product_id,
            event_type,
            event_time: truncate_to_second(event_time),
            // An empty session id carries no identity; store it as unknown.
            session_id: session_id.filter(|s| !s.is_empty()),
        }
    }
}

/// Collaborative filtering hit, scored `10 * recommender_count +
/// interaction_score`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaborativeHit {
    pub product_id: i64,
    /// Distinct similar users that touched this product
    pub recommender_count: i64,
    /// Event-weighted sum over those users' edges
    pub interaction_score: i64,
    pub total_score: i64,
}

/// User with overlapping interaction history, Jaccard-scored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarUser {
    pub user_id: i64,
    pub shared_products: i64,
    pub similarity: f64,
}

/// Item-item co-occurrence over any event type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarProduct {
    pub product_id: i64,
    pub shared_users: i64,
    pub interaction_score: i64,
}

/// Same-session co-purchase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoPurchase {
    pub product_id: i64,
    pub co_purchase_count: i64,
}

/// Same-session co-view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlsoViewed {
    pub product_id: i64,
    pub user_count: i64,
    pub view_count: i64,
}

/// Trending product counters; the per-type breakdown is populated only
/// when no event-type filter was requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingProduct {
    pub product_id: i64,
    pub total_interactions: i64,
    pub unique_users: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchases: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
}

/// Interaction statistics for a single product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductStats {
    pub product_id: i64,
    pub total_interactions: i64,
    pub unique_users: i64,
    pub views: i64,
    pub carts: i64,
    pub purchases: i64,
    /// purchases / views, 0 when there are no views
    pub conversion_rate: f64,
}

/// One entry of a user's interaction history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub product_id: i64,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub session_id: Option<String>,
}

/// Distinct product a user recently viewed or carted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentProduct {
    pub product_id: i64,
    pub last_interaction: DateTime<Utc>,
}

/// Outcome of the recent-purchase check driving mode classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseCheck {
    pub has_purchase: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_purchased_product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl PurchaseCheck {
    pub fn none() -> Self {
        Self {
            has_purchase: false,
            last_purchased_product_id: None,
            purchase_time: None,
            session_id: None,
        }
    }
}

/// Cross-session complementary purchase, scored `2 * buyer_count +
/// purchase_count`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplementaryHit {
    pub product_id: i64,
    pub buyer_count: i64,
    pub purchase_count: i64,
    pub score: i64,
}

/// Candidate re-ranked by global popularity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityRank {
    pub product_id: i64,
    pub total_interactions: i64,
    pub weighted_score: i64,
}

/// Candidate re-ranked by similar-user affinity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffinityRank {
    pub product_id: i64,
    pub similar_user_count: i64,
    pub affinity_score: i64,
}

/// Whole-store counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphStats {
    pub users: i64,
    pub products: i64,
    pub interactions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interaction_truncates_event_time() {
        let time = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::microseconds(999);
        let interaction = Interaction::new(1, 2, EventType::View, time, Some("s-1".into()));
        assert_eq!(interaction.event_time.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn test_interaction_empty_session_becomes_unknown() {
        let interaction =
            Interaction::new(1, 2, EventType::View, chrono::Utc::now(), Some(String::new()));
        assert_eq!(interaction.session_id, None);
    }

    #[test]
    fn test_purchase_check_none_serializes_compactly() {
        let json = serde_json::to_value(PurchaseCheck::none()).unwrap();
        assert_eq!(json, serde_json::json!({"has_purchase": false}));
    }
}
