//! PostgreSQL-backed interaction store
//!
//! The interaction graph is an append-only `interactions` table; users,
//! products, and sessions exist implicitly through the rows that mention
//! them. Every query takes bound parameters and enforces its limit
//! server-side.
//!
//! Event weights used by all scoring queries: purchase = 80, cart = 30,
//! view = 1.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use shopgraph_core::config::GraphConfig;
use shopgraph_core::error::{Result, ShopGraphError};
use shopgraph_core::events::EventType;

use crate::types::*;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS interactions (
        id          BIGSERIAL PRIMARY KEY,
        user_id     BIGINT      NOT NULL,
        product_id  BIGINT      NOT NULL,
        event_type  TEXT        NOT NULL,
        event_time  TIMESTAMPTZ NOT NULL,
        session_id  TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_interactions_user
        ON interactions (user_id, product_id, event_time)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_product
        ON interactions (product_id, user_id, session_id, event_type)",
];

/// Typed API over the behavioral interaction graph
#[derive(Clone)]
pub struct InteractionStore {
    pool: PgPool,
}

impl InteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool using the graph configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(graph_err)?;
        info!("connected to interaction store");
        Ok(Self { pool })
    }

    /// Create the interactions table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(graph_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append one interaction edge. History is preserved: the same
    /// user-product pair may appear any number of times.
    pub async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO interactions (user_id, product_id, event_type, event_time, session_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(interaction.user_id)
        .bind(interaction.product_id)
        .bind(interaction.event_type.as_str())
        .bind(interaction.event_time)
        .bind(&interaction.session_id)
        .execute(&self.pool)
        .await
        .map_err(graph_err)?;

        debug!(
            user_id = interaction.user_id,
            product_id = interaction.product_id,
            event_type = %interaction.event_type,
            "recorded interaction"
        );
        Ok(())
    }

    /// Append a batch of interactions in a single transaction. Partial
    /// failure rolls back the whole batch.
    pub async fn record_batch(&self, interactions: &[Interaction]) -> Result<u64> {
        if interactions.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(graph_err)?;

        let user_ids: Vec<i64> = interactions.iter().map(|i| i.user_id).collect();
        let product_ids: Vec<i64> = interactions.iter().map(|i| i.product_id).collect();
        let event_types: Vec<String> = interactions
            .iter()
            .map(|i| i.event_type.as_str().to_string())
            .collect();
        let event_times: Vec<DateTime<Utc>> = interactions.iter().map(|i| i.event_time).collect();
        let sessions: Vec<Option<String>> =
            interactions.iter().map(|i| i.session_id.clone()).collect();

        let result = sqlx::query(
            "INSERT INTO interactions (user_id, product_id, event_type, event_time, session_id)
             SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::timestamptz[], $5::text[])",
        )
        .bind(&user_ids)
        .bind(&product_ids)
        .bind(&event_types)
        .bind(&event_times)
        .bind(&sessions)
        .execute(&mut *tx)
        .await
        .map_err(graph_err)?;

        tx.commit().await.map_err(graph_err)?;

        info!(count = result.rows_affected(), "recorded interaction batch");
        Ok(result.rows_affected())
    }

    /// Collaborative filtering: products liked by users who share history
    /// with the target user, excluding products the target already touched.
    ///
    /// Each candidate is scored `10 * recommender_count + interaction_score`
    /// where the interaction score sums the event weights over the similar
    /// users' edges.
    pub async fn collaborative(
        &self,
        user_id: i64,
        limit: i64,
        min_shared: i64,
    ) -> Result<Vec<CollaborativeHit>> {
        let rows = sqlx::query(
            "WITH mine AS (
                 SELECT DISTINCT product_id FROM interactions WHERE user_id = $1
             ),
             similar AS (
                 SELECT i.user_id
                 FROM interactions i
                 JOIN mine m ON m.product_id = i.product_id
                 WHERE i.user_id <> $1
                 GROUP BY i.user_id
                 HAVING COUNT(DISTINCT i.product_id) >= $3
             )
             SELECT product_id, recommender_count, interaction_score,
                    recommender_count * 10 + interaction_score AS total_score
             FROM (
                 SELECT i.product_id,
                        COUNT(DISTINCT i.user_id) AS recommender_count,
                        SUM(CASE WHEN i.event_type = 'purchase' THEN 80
                                 WHEN i.event_type = 'cart' THEN 30
                                 WHEN i.event_type = 'view' THEN 1
                                 ELSE 0 END) AS interaction_score
                 FROM interactions i
                 JOIN similar s ON s.user_id = i.user_id
                 WHERE i.product_id NOT IN (SELECT product_id FROM mine)
                 GROUP BY i.product_id
             ) scored
             ORDER BY total_score DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .bind(min_shared)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(CollaborativeHit {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    recommender_count: row.try_get("recommender_count").map_err(graph_err)?,
                    interaction_score: row.try_get("interaction_score").map_err(graph_err)?,
                    total_score: row.try_get("total_score").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Users with overlapping history, ranked by Jaccard similarity over
    /// distinct product sets.
    pub async fn similar_users(&self, user_id: i64, limit: i64) -> Result<Vec<SimilarUser>> {
        let rows = sqlx::query(
            "WITH mine AS (
                 SELECT DISTINCT product_id FROM interactions WHERE user_id = $1
             ),
             shared AS (
                 SELECT i.user_id, COUNT(DISTINCT i.product_id) AS shared_products
                 FROM interactions i
                 JOIN mine m ON m.product_id = i.product_id
                 WHERE i.user_id <> $1
                 GROUP BY i.user_id
             ),
             totals AS (
                 SELECT user_id, COUNT(DISTINCT product_id) AS total_products
                 FROM interactions
                 WHERE user_id IN (SELECT user_id FROM shared)
                 GROUP BY user_id
             )
             SELECT s.user_id, s.shared_products,
                    s.shared_products::float8
                        / ((SELECT COUNT(*) FROM mine) + t.total_products - s.shared_products)
                        AS similarity
             FROM shared s
             JOIN totals t ON t.user_id = s.user_id
             ORDER BY similarity DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(SimilarUser {
                    user_id: row.try_get("user_id").map_err(graph_err)?,
                    shared_products: row.try_get("shared_products").map_err(graph_err)?,
                    similarity: row.try_get("similarity").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Item-item co-occurrence over any event type: products touched by
    /// the users who touched this one. Primary sort is shared users,
    /// tie-break on the event-weighted score.
    pub async fn similar_products(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<SimilarProduct>> {
        let rows = sqlx::query(
            "WITH co_users AS (
                 SELECT DISTINCT user_id FROM interactions WHERE product_id = $1
             )
             SELECT i.product_id,
                    COUNT(DISTINCT i.user_id) AS shared_users,
                    SUM(CASE WHEN i.event_type = 'purchase' THEN 80
                             WHEN i.event_type = 'cart' THEN 30
                             WHEN i.event_type = 'view' THEN 1
                             ELSE 1 END) AS interaction_score
             FROM interactions i
             JOIN co_users u ON u.user_id = i.user_id
             WHERE i.product_id <> $1
             GROUP BY i.product_id
             ORDER BY shared_users DESC, interaction_score DESC
             LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(SimilarProduct {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    shared_users: row.try_get("shared_users").map_err(graph_err)?,
                    interaction_score: row.try_get("interaction_score").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Products purchased together with this one in the same session.
    pub async fn bought_together(&self, product_id: i64, limit: i64) -> Result<Vec<CoPurchase>> {
        let rows = sqlx::query(
            "SELECT r2.product_id, COUNT(*) AS co_purchase_count
             FROM interactions r1
             JOIN interactions r2
               ON r2.user_id = r1.user_id
              AND r2.session_id = r1.session_id
             WHERE r1.product_id = $1
               AND r1.event_type = 'purchase'
               AND r2.event_type = 'purchase'
               AND r2.product_id <> $1
             GROUP BY r2.product_id
             ORDER BY co_purchase_count DESC
             LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(CoPurchase {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    co_purchase_count: row.try_get("co_purchase_count").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Products viewed in the same session as this one.
    pub async fn also_viewed(&self, product_id: i64, limit: i64) -> Result<Vec<AlsoViewed>> {
        let rows = sqlx::query(
            "SELECT r2.product_id,
                    COUNT(DISTINCT r2.user_id) AS user_count,
                    COUNT(*) AS view_count
             FROM interactions r1
             JOIN interactions r2
               ON r2.user_id = r1.user_id
              AND r2.session_id = r1.session_id
             WHERE r1.product_id = $1
               AND r1.event_type = 'view'
               AND r2.event_type = 'view'
               AND r2.product_id <> $1
             GROUP BY r2.product_id
             ORDER BY user_count DESC, view_count DESC
             LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(AlsoViewed {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    user_count: row.try_get("user_count").map_err(graph_err)?,
                    view_count: row.try_get("view_count").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Trending products by interaction volume. With an event-type filter
    /// only matching edges count; without one the per-type counters are
    /// broken out as well.
    pub async fn trending(
        &self,
        limit: i64,
        event_types: Option<&[EventType]>,
    ) -> Result<Vec<TrendingProduct>> {
        match event_types {
            Some(types) => {
                let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
                let rows = sqlx::query(
                    "SELECT product_id,
                            COUNT(*) AS total_interactions,
                            COUNT(DISTINCT user_id) AS unique_users
                     FROM interactions
                     WHERE event_type = ANY($2)
                     GROUP BY product_id
                     ORDER BY total_interactions DESC
                     LIMIT $1",
                )
                .bind(limit)
                .bind(&names)
                .fetch_all(&self.pool)
                .await
                .map_err(graph_err)?;

                rows.iter()
                    .map(|row| {
                        Ok(TrendingProduct {
                            product_id: row.try_get("product_id").map_err(graph_err)?,
                            total_interactions: row
                                .try_get("total_interactions")
                                .map_err(graph_err)?,
                            unique_users: row.try_get("unique_users").map_err(graph_err)?,
                            purchases: None,
                            carts: None,
                            views: None,
                        })
                    })
                    .collect()
            }
            None => {
                let rows = sqlx::query(
                    "SELECT product_id,
                            COUNT(*) AS total_interactions,
                            COUNT(DISTINCT user_id) AS unique_users,
                            SUM(CASE WHEN event_type = 'purchase' THEN 1 ELSE 0 END) AS purchases,
                            SUM(CASE WHEN event_type = 'cart' THEN 1 ELSE 0 END) AS carts,
                            SUM(CASE WHEN event_type = 'view' THEN 1 ELSE 0 END) AS views
                     FROM interactions
                     GROUP BY product_id
                     ORDER BY total_interactions DESC
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(graph_err)?;

                rows.iter()
                    .map(|row| {
                        Ok(TrendingProduct {
                            product_id: row.try_get("product_id").map_err(graph_err)?,
                            total_interactions: row
                                .try_get("total_interactions")
                                .map_err(graph_err)?,
                            unique_users: row.try_get("unique_users").map_err(graph_err)?,
                            purchases: Some(row.try_get("purchases").map_err(graph_err)?),
                            carts: Some(row.try_get("carts").map_err(graph_err)?),
                            views: Some(row.try_get("views").map_err(graph_err)?),
                        })
                    })
                    .collect()
            }
        }
    }

    /// Interaction statistics for one product, or None if the product has
    /// never been seen. `conversion_rate` is purchases over views, 0 when
    /// there are no views.
    pub async fn product_stats(&self, product_id: i64) -> Result<Option<ProductStats>> {
        let row = sqlx::query(
            "SELECT product_id, total_interactions, unique_users, views, carts, purchases,
                    CASE WHEN views > 0 THEN purchases::float8 / views ELSE 0 END
                        AS conversion_rate
             FROM (
                 SELECT product_id,
                        COUNT(*) AS total_interactions,
                        COUNT(DISTINCT user_id) AS unique_users,
                        SUM(CASE WHEN event_type = 'view' THEN 1 ELSE 0 END) AS views,
                        SUM(CASE WHEN event_type = 'cart' THEN 1 ELSE 0 END) AS carts,
                        SUM(CASE WHEN event_type = 'purchase' THEN 1 ELSE 0 END) AS purchases
                 FROM interactions
                 WHERE product_id = $1
                 GROUP BY product_id
             ) stats",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(graph_err)?;

        row.map(|row| {
            Ok(ProductStats {
                product_id: row.try_get("product_id").map_err(graph_err)?,
                total_interactions: row.try_get("total_interactions").map_err(graph_err)?,
                unique_users: row.try_get("unique_users").map_err(graph_err)?,
                views: row.try_get("views").map_err(graph_err)?,
                carts: row.try_get("carts").map_err(graph_err)?,
                purchases: row.try_get("purchases").map_err(graph_err)?,
                conversion_rate: row.try_get("conversion_rate").map_err(graph_err)?,
            })
        })
        .transpose()
    }

    /// A user's interaction history, newest first, optionally filtered by
    /// event type.
    pub async fn user_history(
        &self,
        user_id: i64,
        limit: i64,
        event_types: Option<&[EventType]>,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = match event_types {
            Some(types) => {
                let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
                sqlx::query(
                    "SELECT product_id, event_type, event_time, session_id
                     FROM interactions
                     WHERE user_id = $1 AND event_type = ANY($3)
                     ORDER BY event_time DESC
                     LIMIT $2",
                )
                .bind(user_id)
                .bind(limit)
                .bind(&names)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT product_id, event_type, event_time, session_id
                     FROM interactions
                     WHERE user_id = $1
                     ORDER BY event_time DESC
                     LIMIT $2",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(graph_err)?;

        rows.iter().map(|row| history_entry(row)).collect()
    }

    /// Distinct products the user most recently viewed or carted. Seeds
    /// the semantic-similarity recommender.
    pub async fn recent_viewed(&self, user_id: i64, limit: i64) -> Result<Vec<RecentProduct>> {
        let rows = sqlx::query(
            "SELECT product_id, MAX(event_time) AS last_interaction
             FROM interactions
             WHERE user_id = $1 AND event_type IN ('view', 'cart')
             GROUP BY product_id
             ORDER BY last_interaction DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(RecentProduct {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    last_interaction: row.try_get("last_interaction").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Most recent purchase within the lookback window, if any. Drives the
    /// post-purchase recommendation mode.
    pub async fn has_recent_purchase(
        &self,
        user_id: i64,
        lookback_hours: i64,
    ) -> Result<PurchaseCheck> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let row = sqlx::query(
            "SELECT product_id, event_time, session_id
             FROM interactions
             WHERE user_id = $1 AND event_type = 'purchase' AND event_time >= $2
             ORDER BY event_time DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(graph_err)?;

        match row {
            Some(row) => Ok(PurchaseCheck {
                has_purchase: true,
                last_purchased_product_id: Some(row.try_get("product_id").map_err(graph_err)?),
                purchase_time: Some(row.try_get("event_time").map_err(graph_err)?),
                session_id: row.try_get("session_id").map_err(graph_err)?,
            }),
            None => Ok(PurchaseCheck::none()),
        }
    }

    /// Products purchased by buyers of this product in a *different*
    /// session. Same-session purchases are bundles; cross-session ones are
    /// complements. An unknown session on either side counts as different.
    pub async fn complementary(
        &self,
        product_id: i64,
        limit: i64,
    ) -> Result<Vec<ComplementaryHit>> {
        let rows = sqlx::query(
            "SELECT r2.product_id,
                    COUNT(DISTINCT r2.user_id) AS buyer_count,
                    COUNT(*) AS purchase_count,
                    COUNT(DISTINCT r2.user_id) * 2 + COUNT(*) AS score
             FROM interactions r1
             JOIN interactions r2 ON r2.user_id = r1.user_id
             WHERE r1.product_id = $1
               AND r1.event_type = 'purchase'
               AND r2.event_type = 'purchase'
               AND r2.product_id <> $1
               AND (r1.session_id IS NULL
                    OR r2.session_id IS NULL
                    OR r1.session_id <> r2.session_id)
             GROUP BY r2.product_id
             ORDER BY score DESC
             LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(ComplementaryHit {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    buyer_count: row.try_get("buyer_count").map_err(graph_err)?,
                    purchase_count: row.try_get("purchase_count").map_err(graph_err)?,
                    score: row.try_get("score").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// A user's purchases, newest first. Used to subtract prior purchases
    /// from the complementary flow.
    pub async fn purchase_history(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT product_id, event_type, event_time, session_id
             FROM interactions
             WHERE user_id = $1 AND event_type = 'purchase'
             ORDER BY event_time DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(graph_err)?;

        rows.iter().map(|row| history_entry(row)).collect()
    }

    /// Re-rank candidate products by global event-weighted popularity.
    /// Only products that have been seen at all are returned, so the
    /// result is always a subset of the input ids.
    pub async fn rerank_by_popularity(
        &self,
        product_ids: &[i64],
        limit: Option<i64>,
    ) -> Result<Vec<PopularityRank>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let base = "SELECT p.pid AS product_id,
                           COUNT(i.id) AS total_interactions,
                           COALESCE(SUM(CASE WHEN i.event_type = 'purchase' THEN 80
                                             WHEN i.event_type = 'cart' THEN 30
                                             WHEN i.event_type = 'view' THEN 1
                                             ELSE 0 END), 0) AS weighted_score
                    FROM UNNEST($1::bigint[]) AS p(pid)
                    LEFT JOIN interactions i ON i.product_id = p.pid
                    GROUP BY p.pid
                    HAVING COUNT(i.id) > 0
                    ORDER BY weighted_score DESC";
        let sql = match limit {
            Some(_) => format!("{base} LIMIT $2"),
            None => base.to_string(),
        };

        let mut query = sqlx::query(&sql).bind(product_ids.to_vec());
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(PopularityRank {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    total_interactions: row.try_get("total_interactions").map_err(graph_err)?,
                    weighted_score: row.try_get("weighted_score").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Re-rank candidate products by the affinity of users similar to the
    /// target user (users sharing any product with them).
    pub async fn rerank_for_user(
        &self,
        product_ids: &[i64],
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<AffinityRank>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let base = "WITH mine AS (
                        SELECT DISTINCT product_id FROM interactions WHERE user_id = $2
                    ),
                    similar AS (
                        SELECT DISTINCT i.user_id
                        FROM interactions i
                        JOIN mine m ON m.product_id = i.product_id
                        WHERE i.user_id <> $2
                    )
                    SELECT p.pid AS product_id,
                           COUNT(DISTINCT i.user_id) AS similar_user_count,
                           COALESCE(SUM(CASE WHEN i.event_type = 'purchase' THEN 80
                                             WHEN i.event_type = 'cart' THEN 30
                                             WHEN i.event_type = 'view' THEN 1
                                             ELSE 0 END), 0) AS affinity_score
                    FROM UNNEST($1::bigint[]) AS p(pid)
                    LEFT JOIN interactions i
                           ON i.product_id = p.pid
                          AND i.user_id IN (SELECT user_id FROM similar)
                    WHERE EXISTS (SELECT 1 FROM interactions x WHERE x.product_id = p.pid)
                    GROUP BY p.pid
                    ORDER BY affinity_score DESC";
        let sql = match limit {
            Some(_) => format!("{base} LIMIT $3"),
            None => base.to_string(),
        };

        let mut query = sqlx::query(&sql).bind(product_ids.to_vec()).bind(user_id);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(graph_err)?;

        rows.iter()
            .map(|row| {
                Ok(AffinityRank {
                    product_id: row.try_get("product_id").map_err(graph_err)?,
                    similar_user_count: row.try_get("similar_user_count").map_err(graph_err)?,
                    affinity_score: row.try_get("affinity_score").map_err(graph_err)?,
                })
            })
            .collect()
    }

    /// Whole-store counters.
    pub async fn stats(&self) -> Result<GraphStats> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT user_id) AS users,
                    COUNT(DISTINCT product_id) AS products,
                    COUNT(*) AS interactions
             FROM interactions",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(graph_err)?;

        Ok(GraphStats {
            users: row.try_get("users").map_err(graph_err)?,
            products: row.try_get("products").map_err(graph_err)?,
            interactions: row.try_get("interactions").map_err(graph_err)?,
        })
    }

    /// Connectivity probe.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(graph_err)?;
        Ok(())
    }
}

fn history_entry(row: &sqlx::postgres::PgRow) -> Result<HistoryEntry> {
    let event_type: String = row.try_get("event_type").map_err(graph_err)?;
    Ok(HistoryEntry {
        product_id: row.try_get("product_id").map_err(graph_err)?,
        event_type: EventType::parse(&event_type)?,
        event_time: row.try_get("event_time").map_err(graph_err)?,
        session_id: row.try_get("session_id").map_err(graph_err)?,
    })
}

fn graph_err(error: sqlx::Error) -> ShopGraphError {
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => ShopGraphError::unavailable("graph", error.to_string()),
        _ => ShopGraphError::backend("graph", error.to_string()),
    }
}
