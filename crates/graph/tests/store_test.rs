//! Integration tests for the interaction store.
//!
//! These require a PostgreSQL instance; they skip when DATABASE_URL is not
//! set. Each test works in its own id range so the suite can run in
//! parallel against a shared database.

use chrono::{Duration, Utc};
use shopgraph_core::events::EventType;
use shopgraph_graph::{Interaction, InteractionStore};

async fn setup(base: i64) -> Option<InteractionStore> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .ok()?;
    let store = InteractionStore::new(pool);
    store.ensure_schema().await.ok()?;

    // Clear any residue from a previous run of this test's id range.
    sqlx::query("DELETE FROM interactions WHERE user_id >= $1 AND user_id < $1 + 1000")
        .bind(base)
        .execute(store.pool())
        .await
        .ok()?;
    Some(store)
}

fn event(
    user_id: i64,
    product_id: i64,
    event_type: EventType,
    session: &str,
    age_minutes: i64,
) -> Interaction {
    Interaction::new(
        user_id,
        product_id,
        event_type,
        Utc::now() - Duration::minutes(age_minutes),
        Some(session.to_string()),
    )
}

#[tokio::test]
async fn test_record_and_read_history() {
    let base = 10_000;
    let Some(store) = setup(base).await else { return };

    store
        .record_interaction(&event(base + 1, base + 100, EventType::View, "s-1", 10))
        .await
        .unwrap();
    store
        .record_interaction(&event(base + 1, base + 101, EventType::Purchase, "s-1", 5))
        .await
        .unwrap();

    let history = store.user_history(base + 1, 10, None).await.unwrap();
    assert_eq!(history.len(), 2);
    // Newest first
    assert_eq!(history[0].product_id, base + 101);
    assert_eq!(history[0].event_type, EventType::Purchase);
    // Second precision is preserved end to end
    assert_eq!(history[0].event_time.timestamp_subsec_micros(), 0);

    let filtered = store
        .user_history(base + 1, 10, Some(&[EventType::Purchase]))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
}

#[tokio::test]
async fn test_history_is_append_only() {
    let base = 11_000;
    let Some(store) = setup(base).await else { return };

    let interaction = event(base + 1, base + 100, EventType::View, "s-1", 1);
    store.record_interaction(&interaction).await.unwrap();
    store.record_interaction(&interaction).await.unwrap();

    let history = store.user_history(base + 1, 10, None).await.unwrap();
    assert_eq!(history.len(), 2, "duplicate edges must both be kept");
}

#[tokio::test]
async fn test_batch_commits_atomically() {
    let base = 12_000;
    let Some(store) = setup(base).await else { return };

    let batch: Vec<Interaction> = (0..5)
        .map(|i| event(base + 1, base + 100 + i, EventType::View, "s-1", i))
        .collect();
    let count = store.record_batch(&batch).await.unwrap();
    assert_eq!(count, 5);

    assert_eq!(store.record_batch(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_collaborative_seed_scenario() {
    // Users A, B, C each view product 100; B and C also purchase 200.
    // Collaborative recommendations for A must surface 200 with two
    // recommenders.
    let base = 13_000;
    let Some(store) = setup(base).await else { return };

    let (a, b, c) = (base + 1, base + 2, base + 3);
    let (p100, p200) = (base + 100, base + 200);
    for user in [a, b, c] {
        store
            .record_interaction(&event(user, p100, EventType::View, "s-1", 10))
            .await
            .unwrap();
    }
    for user in [b, c] {
        store
            .record_interaction(&event(user, p200, EventType::Purchase, "s-2", 5))
            .await
            .unwrap();
    }

    let hits = store.collaborative(a, 10, 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].product_id, p200);
    assert_eq!(hits[0].recommender_count, 2);
    // 2 recommenders * 10 + 2 purchases * 80
    assert_eq!(hits[0].total_score, 180);
}

#[tokio::test]
async fn test_similar_users_jaccard() {
    let base = 14_000;
    let Some(store) = setup(base).await else { return };

    let (me, other) = (base + 1, base + 2);
    // me: {100, 101}; other: {100, 102}; shared = 1, union = 3
    for (user, product) in [(me, 100), (me, 101), (other, 100), (other, 102)] {
        store
            .record_interaction(&event(user, base + product, EventType::View, "s-1", 1))
            .await
            .unwrap();
    }

    let similar = store.similar_users(me, 10).await.unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].user_id, other);
    assert_eq!(similar[0].shared_products, 1);
    assert!((similar[0].similarity - 1.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_trending_orders_by_volume() {
    // 100 purchases of product 7 from distinct users, 10 of product 8.
    let base = 15_000;
    let Some(store) = setup(base).await else { return };

    let (p7, p8) = (base + 7, base + 8);
    let mut batch = Vec::new();
    for user in 1..=100 {
        batch.push(event(base + user, p7, EventType::Purchase, "s", 30));
    }
    for user in 101..=110 {
        batch.push(event(base + user, p8, EventType::Purchase, "s", 30));
    }
    store.record_batch(&batch).await.unwrap();

    let trending = store.trending(10, None).await.unwrap();
    assert_eq!(trending[0].product_id, p7);
    assert_eq!(trending[0].total_interactions, 100);
    assert_eq!(trending[0].unique_users, 100);
    assert_eq!(trending[0].purchases, Some(100));

    let purchases_only = store
        .trending(10, Some(&[EventType::Purchase]))
        .await
        .unwrap();
    assert_eq!(purchases_only[0].product_id, p7);
    assert_eq!(purchases_only[0].purchases, None, "no breakdown when filtered");
}

#[tokio::test]
async fn test_product_stats_conversion_rate() {
    let base = 16_000;
    let Some(store) = setup(base).await else { return };

    let product = base + 100;
    store
        .record_interaction(&event(base + 1, product, EventType::View, "s-1", 3))
        .await
        .unwrap();
    store
        .record_interaction(&event(base + 2, product, EventType::View, "s-2", 2))
        .await
        .unwrap();
    store
        .record_interaction(&event(base + 1, product, EventType::Purchase, "s-1", 1))
        .await
        .unwrap();

    let stats = store.product_stats(product).await.unwrap().unwrap();
    assert_eq!(stats.views, 2);
    assert_eq!(stats.purchases, 1);
    assert_eq!(stats.unique_users, 2);
    assert!((stats.conversion_rate - 0.5).abs() < 1e-9);

    // Purchases without views convert at zero, not infinity.
    let cart_only = base + 101;
    store
        .record_interaction(&event(base + 3, cart_only, EventType::Purchase, "s-3", 1))
        .await
        .unwrap();
    let stats = store.product_stats(cart_only).await.unwrap().unwrap();
    assert_eq!(stats.conversion_rate, 0.0);

    // Unknown product
    assert!(store.product_stats(base + 999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bought_together_requires_same_session() {
    let base = 17_000;
    let Some(store) = setup(base).await else { return };

    let (p1, p2, p3) = (base + 1, base + 2, base + 3);
    let user = base + 10;
    store
        .record_interaction(&event(user, p1, EventType::Purchase, "s-1", 5))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, p2, EventType::Purchase, "s-1", 4))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, p3, EventType::Purchase, "s-2", 3))
        .await
        .unwrap();

    let together = store.bought_together(p1, 10).await.unwrap();
    let ids: Vec<i64> = together.iter().map(|c| c.product_id).collect();
    assert!(ids.contains(&p2));
    assert!(!ids.contains(&p3), "cross-session purchase is not a bundle");
}

#[tokio::test]
async fn test_similar_products_sorts_by_shared_users() {
    let base = 25_000;
    let Some(store) = setup(base).await else { return };

    let (seed, by_two, by_one) = (base + 1, base + 2, base + 3);
    for user in [base + 10, base + 11] {
        store
            .record_interaction(&event(user, seed, EventType::View, "s", 10))
            .await
            .unwrap();
        store
            .record_interaction(&event(user, by_two, EventType::View, "s", 9))
            .await
            .unwrap();
    }
    // One co-user touches by_one with a heavy event; shared-user count
    // still wins over the weighted score.
    store
        .record_interaction(&event(base + 10, by_one, EventType::Purchase, "s", 8))
        .await
        .unwrap();

    let similar = store.similar_products(seed, 10).await.unwrap();
    assert_eq!(similar[0].product_id, by_two);
    assert_eq!(similar[0].shared_users, 2);
    assert_eq!(similar[1].product_id, by_one);
    assert_eq!(similar[1].interaction_score, 80);
}

#[tokio::test]
async fn test_also_viewed_same_session_views_only() {
    let base = 26_000;
    let Some(store) = setup(base).await else { return };

    let (seed, in_session, other_session) = (base + 1, base + 2, base + 3);
    let user = base + 10;
    store
        .record_interaction(&event(user, seed, EventType::View, "s-1", 5))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, in_session, EventType::View, "s-1", 4))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, other_session, EventType::View, "s-2", 3))
        .await
        .unwrap();

    let viewed = store.also_viewed(seed, 10).await.unwrap();
    let ids: Vec<i64> = viewed.iter().map(|v| v.product_id).collect();
    assert_eq!(ids, vec![in_session]);
    assert_eq!(viewed[0].user_count, 1);
    assert_eq!(viewed[0].view_count, 1);
}

#[tokio::test]
async fn test_complementary_cross_session_scenario() {
    // Buyers of 500 in session s1 who later bought 700 in another
    // session; 700 must come back as a complement for 500.
    let base = 18_000;
    let Some(store) = setup(base).await else { return };

    let (p500, p700) = (base + 500, base + 700);
    for user in 1..=5 {
        store
            .record_interaction(&event(base + user, p500, EventType::Purchase, "s1", 60))
            .await
            .unwrap();
        store
            .record_interaction(&event(base + user, p700, EventType::Purchase, "s2", 30))
            .await
            .unwrap();
    }
    // Same-session pair must not count as complementary.
    store
        .record_interaction(&event(base + 6, p500, EventType::Purchase, "s3", 10))
        .await
        .unwrap();
    store
        .record_interaction(&event(base + 6, base + 800, EventType::Purchase, "s3", 9))
        .await
        .unwrap();

    let complements = store.complementary(p500, 10).await.unwrap();
    assert_eq!(complements[0].product_id, p700);
    assert_eq!(complements[0].buyer_count, 5);
    assert_eq!(complements[0].purchase_count, 5);
    // 5 buyers * 2 + 5 purchases
    assert_eq!(complements[0].score, 15);
    assert!(!complements.iter().any(|c| c.product_id == base + 800));
}

#[tokio::test]
async fn test_has_recent_purchase_enforces_window() {
    let base = 19_000;
    let Some(store) = setup(base).await else { return };

    let user = base + 1;
    // A purchase 48 hours ago is outside a 24 hour lookback.
    store
        .record_interaction(&event(user, base + 100, EventType::Purchase, "s-1", 48 * 60))
        .await
        .unwrap();
    let check = store.has_recent_purchase(user, 24).await.unwrap();
    assert!(!check.has_purchase);

    store
        .record_interaction(&event(user, base + 101, EventType::Purchase, "s-2", 60))
        .await
        .unwrap();
    let check = store.has_recent_purchase(user, 24).await.unwrap();
    assert!(check.has_purchase);
    assert_eq!(check.last_purchased_product_id, Some(base + 101));
    assert_eq!(check.session_id.as_deref(), Some("s-2"));
}

#[tokio::test]
async fn test_recent_viewed_is_distinct_and_ordered() {
    let base = 20_000;
    let Some(store) = setup(base).await else { return };

    let user = base + 1;
    store
        .record_interaction(&event(user, base + 100, EventType::View, "s-1", 30))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, base + 100, EventType::View, "s-1", 5))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, base + 101, EventType::Cart, "s-1", 10))
        .await
        .unwrap();
    store
        .record_interaction(&event(user, base + 102, EventType::Purchase, "s-1", 1))
        .await
        .unwrap();

    let recent = store.recent_viewed(user, 10).await.unwrap();
    let ids: Vec<i64> = recent.iter().map(|r| r.product_id).collect();
    assert_eq!(ids, vec![base + 100, base + 101], "distinct, newest first, no purchases");
}

#[tokio::test]
async fn test_rerank_by_popularity_returns_subset() {
    let base = 21_000;
    let Some(store) = setup(base).await else { return };

    let (known, unknown) = (base + 100, base + 999);
    store
        .record_interaction(&event(base + 1, known, EventType::Purchase, "s-1", 1))
        .await
        .unwrap();

    let ranked = store
        .rerank_by_popularity(&[known, unknown], None)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 1, "never invents products");
    assert_eq!(ranked[0].product_id, known);
    assert_eq!(ranked[0].weighted_score, 80);

    assert!(store.rerank_by_popularity(&[], None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rerank_for_user_boosts_similar_users_choices() {
    let base = 22_000;
    let Some(store) = setup(base).await else { return };

    let (me, peer) = (base + 1, base + 2);
    let (shared, liked, ignored) = (base + 100, base + 101, base + 102);
    store
        .record_interaction(&event(me, shared, EventType::View, "s-1", 20))
        .await
        .unwrap();
    store
        .record_interaction(&event(peer, shared, EventType::View, "s-2", 19))
        .await
        .unwrap();
    store
        .record_interaction(&event(peer, liked, EventType::Purchase, "s-2", 18))
        .await
        .unwrap();
    store
        .record_interaction(&event(base + 3, ignored, EventType::View, "s-3", 17))
        .await
        .unwrap();

    let ranked = store
        .rerank_for_user(&[liked, ignored], me, None)
        .await
        .unwrap();
    assert_eq!(ranked[0].product_id, liked);
    assert_eq!(ranked[0].similar_user_count, 1);
    assert_eq!(ranked[0].affinity_score, 80);
    assert_eq!(ranked[1].product_id, ignored);
    assert_eq!(ranked[1].affinity_score, 0);
}

#[tokio::test]
async fn test_limit_zero_returns_empty() {
    let base = 23_000;
    let Some(store) = setup(base).await else { return };

    store
        .record_interaction(&event(base + 1, base + 100, EventType::View, "s-1", 1))
        .await
        .unwrap();

    assert!(store.trending(0, None).await.unwrap().is_empty());
    assert!(store.user_history(base + 1, 0, None).await.unwrap().is_empty());
    assert!(store.recent_viewed(base + 1, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_and_ping() {
    let base = 24_000;
    let Some(store) = setup(base).await else { return };

    store.ping().await.unwrap();
    store
        .record_interaction(&event(base + 1, base + 100, EventType::View, "s-1", 1))
        .await
        .unwrap();
    let stats = store.stats().await.unwrap();
    assert!(stats.users >= 1);
    assert!(stats.products >= 1);
    assert!(stats.interactions >= 1);
}
