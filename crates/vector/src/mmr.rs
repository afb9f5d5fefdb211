//! Maximal Marginal Relevance re-selection
//!
//! Re-selects top-k results from a wider candidate pool, trading query
//! relevance against redundancy within the selected set:
//!
//! `mmr(r) = (1 - lambda) * sim(r, q) - lambda * max_{s in S} sim(r, s)`
//!
//! `sim(r, q)` is the search score the index already computed (cosine),
//! so with `lambda = 0` the selection order is exactly the plain search
//! order. Candidate-order ties break toward the earlier candidate.

use shopgraph_core::math::cosine_similarity;

/// Scored candidate carrying its stored vector
#[derive(Debug, Clone)]
pub struct MmrCandidate {
    pub id: i64,
    /// Cosine similarity to the query, as scored by the index
    pub score: f32,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Select up to `limit` candidates in MMR order.
pub fn select(candidates: Vec<MmrCandidate>, diversity: f32, limit: usize) -> Vec<MmrCandidate> {
    if limit == 0 || candidates.is_empty() {
        return Vec::new();
    }
    let lambda = diversity.clamp(0.0, 1.0);

    let mut remaining = candidates;
    // Max similarity of each remaining candidate to the selected set,
    // updated incrementally as selections are made.
    let mut max_sim = vec![0.0f32; remaining.len()];
    let mut selected = Vec::with_capacity(limit.min(remaining.len()));

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (index, candidate) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() { 0.0 } else { max_sim[index] };
            let mmr = (1.0 - lambda) * candidate.score - lambda * penalty;
            if mmr > best_score {
                best_score = mmr;
                best_index = index;
            }
        }

        let chosen = remaining.remove(best_index);
        max_sim.remove(best_index);
        for (index, candidate) in remaining.iter().enumerate() {
            let sim = cosine_similarity(&candidate.vector, &chosen.vector);
            if sim > max_sim[index] {
                max_sim[index] = sim;
            }
        }
        selected.push(chosen);
    }

    selected
}
