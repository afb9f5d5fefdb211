//! Recommendation engine
//!
//! Classifies the user's activity phase, fans in behavioral, trending,
//! and mode-specific sources under weighted budgets, deduplicates by
//! product keeping the best score, enriches with product payload, and
//! paginates. A failing source empties itself with a warning; the engine
//! never fails a request outright.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use shopgraph_core::config::RecommendConfig;
use shopgraph_core::events::EventType;
use shopgraph_core::health::{AggregatedHealth, ComponentHealth};
use shopgraph_vector::SearchRequest;

use crate::sources::{BehaviorQueries, SimilaritySearch};
use crate::types::{
    Budget, ForYouResponse, ModeContext, RecommendationMode, RecommendationRequest,
    RecommendationResponse, RecommendationSource, RecommendedItem, UserModeResponse,
};

/// How many recent products seed the semantic-similarity source
const ACTIVITY_SEEDS: usize = 3;
/// How much history feeds the already-seen exclusion set
const SEEN_HISTORY_LIMIT: i64 = 500;
/// How many prior purchases are subtracted from the complementary flow
const PURCHASE_EXCLUSION_LIMIT: i64 = 50;

/// Mode-selecting recommendation orchestrator
pub struct Orchestrator {
    graph: Arc<dyn BehaviorQueries>,
    vector: Arc<dyn SimilaritySearch>,
    config: RecommendConfig,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<dyn BehaviorQueries>,
        vector: Arc<dyn SimilaritySearch>,
        config: RecommendConfig,
    ) -> Self {
        Self {
            graph,
            vector,
            config,
        }
    }

    /// Determine the user's activity phase. Any classification failure
    /// degrades to cold start.
    pub async fn classify_mode(
        &self,
        user_id: i64,
        lookback_hours: i64,
    ) -> (RecommendationMode, Option<ModeContext>) {
        match self.graph.has_recent_purchase(user_id, lookback_hours).await {
            Ok(check) if check.has_purchase => (
                RecommendationMode::PostPurchase,
                Some(ModeContext::PostPurchase(check)),
            ),
            Ok(_) => match self.graph.user_history(user_id, 5).await {
                Ok(history) if !history.is_empty() => (
                    RecommendationMode::Browsing,
                    Some(ModeContext::Browsing {
                        recent_interactions: history.len(),
                    }),
                ),
                Ok(_) => (RecommendationMode::ColdStart, None),
                Err(e) => {
                    warn!(user_id, error = %e, "mode classification failed; using cold start");
                    (RecommendationMode::ColdStart, None)
                }
            },
            Err(e) => {
                warn!(user_id, error = %e, "mode classification failed; using cold start");
                (RecommendationMode::ColdStart, None)
            }
        }
    }

    /// Mode probe for the control surface.
    pub async fn user_mode(&self, user_id: i64, lookback_hours: Option<i64>) -> UserModeResponse {
        let lookback = lookback_hours.unwrap_or(self.config.lookback_hours);
        let (mode, context) = self.classify_mode(user_id, lookback).await;
        UserModeResponse {
            mode,
            context,
            strategy: strategy_description(mode).to_string(),
        }
    }

    /// Produce orchestrated recommendations for a user.
    pub async fn recommend(&self, request: RecommendationRequest) -> RecommendationResponse {
        let user_id = request.user_id;
        let (mode, context) = self.classify_mode(user_id, self.config.lookback_hours).await;
        info!(user_id, mode = ?mode, "orchestrating recommendations");

        let behavioral_weight = request
            .behavioral_weight
            .unwrap_or(self.config.behavioral_weight);
        let trending_weight = request
            .trending_weight
            .unwrap_or(self.config.trending_weight);
        let activity_weight = request
            .activity_weight
            .unwrap_or(self.config.activity_weight);
        let mmr_diversity = request.mmr_diversity.unwrap_or(self.config.mmr_diversity);
        let budget = Budget::allocate(
            request.limit,
            behavioral_weight,
            trending_weight,
            activity_weight,
        );

        let mut items: Vec<RecommendedItem> = Vec::new();
        let mut sources_used: Vec<RecommendationSource> = Vec::new();

        // Behavioral and trending run in every mode.
        let behavioral = self.behavioral_items(user_id, budget.behavioral).await;
        if !behavioral.is_empty() {
            sources_used.push(RecommendationSource::Behavioral);
            items.extend(behavioral);
        }

        let trending = self.trending_items(budget.trending, None).await;
        if !trending.is_empty() {
            sources_used.push(RecommendationSource::Trending);
            items.extend(trending);
        }

        match mode {
            RecommendationMode::PostPurchase => {
                let purchased = match &context {
                    Some(ModeContext::PostPurchase(check)) => check.last_purchased_product_id,
                    _ => None,
                };
                if let Some(product_id) = purchased {
                    let complementary = self
                        .complementary_items(product_id, user_id, budget.activity)
                        .await;
                    if !complementary.is_empty() {
                        sources_used.push(RecommendationSource::Complementary);
                        items.extend(complementary);
                    }
                }
            }
            RecommendationMode::Browsing => {
                let exclude: HashSet<i64> = items.iter().map(|i| i.product_id).collect();
                let similar = self
                    .similar_to_recent_activity(user_id, budget.activity, mmr_diversity, &exclude)
                    .await;
                if !similar.is_empty() {
                    sources_used.push(RecommendationSource::SemanticSimilar);
                    items.extend(similar);
                }
            }
            RecommendationMode::ColdStart => {
                let exclude: HashSet<i64> = items.iter().map(|i| i.product_id).collect();
                let bestsellers = self
                    .trending_items(budget.activity, Some(&[EventType::Purchase]))
                    .await;
                let mut added = false;
                for item in bestsellers {
                    if !exclude.contains(&item.product_id) {
                        items.push(item);
                        added = true;
                    }
                }
                if added && !sources_used.contains(&RecommendationSource::Trending) {
                    sources_used.push(RecommendationSource::Trending);
                }
            }
        }

        let mut unique = dedup_best(items);
        unique.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        unique.truncate(request.limit);

        self.enrich(&mut unique).await;

        if !request.include_reasons {
            for item in &mut unique {
                item.reason = None;
            }
        }

        RecommendationResponse {
            user_id,
            mode,
            mode_context: context,
            total_count: unique.len(),
            sources_used: unique_sources(sources_used),
            strategy: strategy_description(mode).to_string(),
            recommendations: unique,
        }
    }

    /// Paginated "For You" feed: over-fetch one page beyond the requested
    /// one, slice, and report whether more remain.
    pub async fn for_you(
        &self,
        user_id: i64,
        page: usize,
        page_size: usize,
        mmr_diversity: Option<f32>,
    ) -> ForYouResponse {
        let page = page.max(1);
        let total_needed = page * page_size + page_size;

        let mut request = RecommendationRequest::for_user(user_id).with_limit(total_needed);
        request.mmr_diversity = mmr_diversity;
        let result = self.recommend(request).await;

        let start = (page - 1) * page_size;
        let end = start + page_size;
        let has_more = result.recommendations.len() > end;
        let recommendations: Vec<RecommendedItem> = result
            .recommendations
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();

        ForYouResponse {
            user_id,
            page,
            page_size,
            has_more,
            mode: result.mode,
            strategy: result.strategy,
            recommendations,
        }
    }

    /// Aggregate graph and vector health; degraded when either is down.
    pub async fn health(&self) -> AggregatedHealth {
        let graph = match self.graph.ping().await {
            Ok(()) => match self.graph.stats().await {
                Ok(stats) => ComponentHealth::healthy("graph").with_detail(serde_json::json!({
                    "users": stats.users,
                    "products": stats.products,
                    "interactions": stats.interactions,
                })),
                Err(e) => ComponentHealth::unhealthy("graph", e.to_string()),
            },
            Err(e) => ComponentHealth::unhealthy("graph", e.to_string()),
        };

        let vector = match self.vector.collection_health().await {
            Ok(summary) => ComponentHealth::healthy("vector").with_detail(serde_json::json!({
                "collection": summary.name,
                "points_count": summary.points_count,
            })),
            Err(e) => ComponentHealth::unhealthy("vector", e.to_string()),
        };

        AggregatedHealth::from_components(vec![graph, vector])
    }

    async fn behavioral_items(&self, user_id: i64, limit: usize) -> Vec<RecommendedItem> {
        match self.graph.collaborative(user_id, limit as i64, 1).await {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| RecommendedItem {
                    product_id: hit.product_id,
                    score: hit.total_score as f64,
                    source: RecommendationSource::Behavioral,
                    reason: Some(format!("Based on {} similar users", hit.recommender_count)),
                    payload: None,
                })
                .collect(),
            Err(e) => {
                warn!(user_id, error = %e, "behavioral source failed");
                Vec::new()
            }
        }
    }

    async fn trending_items(
        &self,
        limit: usize,
        event_types: Option<&[EventType]>,
    ) -> Vec<RecommendedItem> {
        match self.graph.trending(limit as i64, event_types).await {
            Ok(products) => products
                .into_iter()
                .map(|product| RecommendedItem {
                    product_id: product.product_id,
                    score: product.total_interactions as f64,
                    source: RecommendationSource::Trending,
                    reason: Some(format!("Popular with {} users", product.unique_users)),
                    payload: None,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "trending source failed");
                Vec::new()
            }
        }
    }

    /// Complementary products for the last purchase, minus everything the
    /// user already bought.
    async fn complementary_items(
        &self,
        purchased_product_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Vec<RecommendedItem> {
        let exclude: HashSet<i64> = match self
            .graph
            .purchase_history(user_id, PURCHASE_EXCLUSION_LIMIT)
            .await
        {
            Ok(history) => history.into_iter().map(|h| h.product_id).collect(),
            Err(e) => {
                warn!(user_id, error = %e, "purchase history lookup failed");
                HashSet::new()
            }
        };

        // Over-fetch to survive the exclusions.
        let fetch_limit = (limit + exclude.len()) as i64;
        match self.graph.complementary(purchased_product_id, fetch_limit).await {
            Ok(hits) => hits
                .into_iter()
                .filter(|hit| !exclude.contains(&hit.product_id))
                .take(limit)
                .map(|hit| RecommendedItem {
                    product_id: hit.product_id,
                    score: hit.score as f64,
                    source: RecommendationSource::Complementary,
                    reason: Some(format!(
                        "Complements your recent purchase ({} buyers also got this)",
                        hit.buyer_count
                    )),
                    payload: None,
                })
                .collect(),
            Err(e) => {
                warn!(purchased_product_id, error = %e, "complementary source failed");
                Vec::new()
            }
        }
    }

    /// Products semantically similar to the user's recent views and
    /// carts, diversified with MMR. Excludes anything already in the
    /// accumulator and anything the user has interacted with.
    async fn similar_to_recent_activity(
        &self,
        user_id: i64,
        limit: usize,
        mmr_diversity: f32,
        exclude: &HashSet<i64>,
    ) -> Vec<RecommendedItem> {
        if limit == 0 {
            return Vec::new();
        }

        let recent = match self.graph.recent_viewed(user_id, 5).await {
            Ok(recent) if !recent.is_empty() => recent,
            Ok(_) => {
                debug!(user_id, "no recent activity to seed semantic search");
                return Vec::new();
            }
            Err(e) => {
                warn!(user_id, error = %e, "recent activity lookup failed");
                return Vec::new();
            }
        };

        let mut seen: HashSet<i64> = exclude.clone();
        seen.extend(recent.iter().map(|r| r.product_id));
        match self.graph.user_history(user_id, SEEN_HISTORY_LIMIT).await {
            Ok(history) => seen.extend(history.into_iter().map(|h| h.product_id)),
            Err(e) => warn!(user_id, error = %e, "history exclusion lookup failed"),
        }

        let mut results: Vec<RecommendedItem> = Vec::new();
        for seed in recent.iter().take(ACTIVITY_SEEDS) {
            let points = match self.vector.retrieve(&[seed.product_id], true).await {
                Ok(points) => points,
                Err(e) => {
                    warn!(product_id = seed.product_id, error = %e, "vector retrieval failed");
                    continue;
                }
            };
            let Some(vector) = points.into_iter().next().and_then(|p| p.vector) else {
                continue;
            };

            let request = SearchRequest::new(vector, limit).with_mmr(mmr_diversity);
            match self.vector.search(request).await {
                Ok(hits) => {
                    for hit in hits {
                        if seen.insert(hit.id) {
                            let payload = match &hit.payload {
                                serde_json::Value::Object(map) if !map.is_empty() => {
                                    Some(hit.payload.clone())
                                }
                                _ => None,
                            };
                            results.push(RecommendedItem {
                                product_id: hit.id,
                                score: hit.score as f64,
                                source: RecommendationSource::SemanticSimilar,
                                reason: Some("Similar to recently viewed item".to_string()),
                                payload,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(product_id = seed.product_id, error = %e, "semantic search failed");
                }
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    /// Attach product payloads to items that lack one. Enrichment failure
    /// leaves the items bare rather than failing the request.
    async fn enrich(&self, items: &mut [RecommendedItem]) {
        let missing: Vec<i64> = items
            .iter()
            .filter(|item| item.payload.is_none())
            .map(|item| item.product_id)
            .collect();
        if missing.is_empty() {
            return;
        }

        match self.vector.retrieve(&missing, false).await {
            Ok(points) => {
                let payloads: HashMap<i64, serde_json::Value> =
                    points.into_iter().map(|p| (p.id, p.payload)).collect();
                let mut enriched = 0;
                for item in items.iter_mut() {
                    if item.payload.is_none() {
                        if let Some(payload) = payloads.get(&item.product_id) {
                            item.payload = Some(payload.clone());
                            enriched += 1;
                        }
                    }
                }
                debug!(enriched, "attached product payloads");
            }
            Err(e) => warn!(error = %e, "payload enrichment failed"),
        }
    }
}

/// Deduplicate by product id. The first occurrence keeps its position;
/// a later occurrence with a strictly greater score replaces it in place.
pub fn dedup_best(items: Vec<RecommendedItem>) -> Vec<RecommendedItem> {
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<RecommendedItem> = Vec::with_capacity(items.len());
    for item in items {
        match positions.get(&item.product_id) {
            Some(&index) => {
                if item.score > unique[index].score {
                    unique[index] = item;
                }
            }
            None => {
                positions.insert(item.product_id, unique.len());
                unique.push(item);
            }
        }
    }
    unique
}

fn unique_sources(sources: Vec<RecommendationSource>) -> Vec<RecommendationSource> {
    let mut seen = HashSet::new();
    sources.into_iter().filter(|s| seen.insert(*s)).collect()
}

fn strategy_description(mode: RecommendationMode) -> &'static str {
    match mode {
        RecommendationMode::Browsing => {
            "Exploring mode: semantic search with high diversity surfaces varied \
             options similar to your recent activity, combined with behavioral \
             insights and trending items."
        }
        RecommendationMode::PostPurchase => {
            "Post-purchase mode: complementary products that other buyers paired \
             with your recent purchase, along with personalized behavioral \
             recommendations."
        }
        RecommendationMode::ColdStart => {
            "New user mode: popular and trending products help you discover items \
             while we learn your preferences."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, score: f64, source: RecommendationSource) -> RecommendedItem {
        RecommendedItem {
            product_id,
            score,
            source,
            reason: None,
            payload: None,
        }
    }

    #[test]
    fn test_dedup_keeps_higher_score_in_place() {
        let deduped = dedup_best(vec![
            item(10, 0.5, RecommendationSource::Behavioral),
            item(11, 0.4, RecommendationSource::Trending),
            item(10, 0.9, RecommendationSource::Trending),
        ]);
        assert_eq!(deduped.len(), 2);
        // The winning duplicate keeps the first occurrence's slot.
        assert_eq!(deduped[0].product_id, 10);
        assert_eq!(deduped[0].score, 0.9);
        assert_eq!(deduped[0].source, RecommendationSource::Trending);
    }

    #[test]
    fn test_dedup_lower_score_does_not_replace() {
        let deduped = dedup_best(vec![
            item(10, 0.9, RecommendationSource::Trending),
            item(10, 0.5, RecommendationSource::Behavioral),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].score, 0.9);
        assert_eq!(deduped[0].source, RecommendationSource::Trending);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let input = vec![
            item(1, 0.3, RecommendationSource::Behavioral),
            item(2, 0.2, RecommendationSource::Trending),
            item(1, 0.8, RecommendationSource::SemanticSimilar),
        ];
        let once = dedup_best(input);
        let twice = dedup_best(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unique_sources_preserves_first_occurrence_order() {
        let sources = unique_sources(vec![
            RecommendationSource::Behavioral,
            RecommendationSource::Trending,
            RecommendationSource::Behavioral,
        ]);
        assert_eq!(
            sources,
            vec![
                RecommendationSource::Behavioral,
                RecommendationSource::Trending
            ]
        );
    }
}
