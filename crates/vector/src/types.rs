//! Request and result types for the vector index

use serde::Serialize;

/// Value to match against a payload field. The filter is a conjunction of
/// equality predicates; floats are matched as a degenerate range.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTarget {
    Keyword(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

/// One equality predicate on a payload field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub value: MatchTarget,
}

impl FieldMatch {
    pub fn keyword(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: MatchTarget::Keyword(value.into()),
        }
    }

    pub fn integer(field: impl Into<String>, value: i64) -> Self {
        Self {
            field: field.into(),
            value: MatchTarget::Integer(value),
        }
    }

    pub fn float(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            value: MatchTarget::Float(value),
        }
    }
}

/// kNN search request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub filter: Vec<FieldMatch>,
    pub use_mmr: bool,
    /// MMR lambda in [0, 1]; 0 is pure relevance
    pub mmr_diversity: f32,
    /// Candidate pool for MMR; defaults to 10 * limit
    pub mmr_candidates: Option<usize>,
    pub hnsw_ef: Option<u64>,
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            score_threshold: None,
            filter: Vec::new(),
            use_mmr: false,
            mmr_diversity: 0.0,
            mmr_candidates: None,
            hnsw_ef: None,
        }
    }

    pub fn with_mmr(mut self, diversity: f32) -> Self {
        self.use_mmr = true;
        self.mmr_diversity = diversity;
        self
    }

    pub fn with_mmr_candidates(mut self, candidates: usize) -> Self {
        self.mmr_candidates = Some(candidates);
        self
    }

    pub fn with_filter(mut self, filter: Vec<FieldMatch>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    /// Effective candidate pool size for the MMR pass.
    pub fn candidate_pool(&self) -> usize {
        self.mmr_candidates.unwrap_or(self.limit * 10)
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// A point retrieved by id; `vector` is present only when requested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPoint {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub payload: serde_json::Value,
}

/// Collection-level counters for the health probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub points_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_pool_defaults_to_ten_times_limit() {
        let request = SearchRequest::new(vec![0.0; 4], 5);
        assert_eq!(request.candidate_pool(), 50);
        let request = request.with_mmr_candidates(17);
        assert_eq!(request.candidate_pool(), 17);
    }

    #[test]
    fn test_builder_sets_mmr() {
        let request = SearchRequest::new(vec![0.0; 4], 5).with_mmr(0.7);
        assert!(request.use_mmr);
        assert!((request.mmr_diversity - 0.7).abs() < 1e-6);
    }
}
