//! Event projectors and the per-message decision logic
//!
//! A projector applies one decoded envelope to its backing store. The
//! message handling itself is a pure decision function over the body, the
//! projector result, and the retry schedule, so the retry semantics are
//! testable without a broker:
//!
//! - undecodable or incomplete bodies are rejected without requeue (the
//!   broker dead-letters them; they are never retried)
//! - a failed apply with retry budget left yields a delayed republish
//! - an exhausted or non-retryable failure is dead-lettered

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use shopgraph_broker::{GRAPH_QUEUE, VECTOR_QUEUE};
use shopgraph_core::error::Result;
use shopgraph_core::events::EventEnvelope;

use crate::admission::{interaction_from, GraphWriter};

/// Applies decoded events to a projection
#[async_trait]
pub trait Projector: Send + Sync {
    /// Queue this projector consumes from
    fn queue(&self) -> &'static str;

    async fn apply(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Projects events into the interaction graph
pub struct GraphProjector {
    graph: Arc<dyn GraphWriter>,
}

impl GraphProjector {
    pub fn new(graph: Arc<dyn GraphWriter>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Projector for GraphProjector {
    fn queue(&self) -> &'static str {
        GRAPH_QUEUE
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<()> {
        let interaction = interaction_from(envelope);
        self.graph.record_interaction(&interaction).await
    }
}

/// Reserved hook for vector-side projections (user-profile vectors,
/// interaction-weighted centroids). Consumes and acknowledges events
/// without side effects until a projection scheme lands.
pub struct VectorProjector;

#[async_trait]
impl Projector for VectorProjector {
    fn queue(&self) -> &'static str {
        VECTOR_QUEUE
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<()> {
        debug!(
            user_id = envelope.user_id,
            product_id = envelope.product_id,
            event_type = %envelope.event_type,
            "vector projection hook"
        );
        Ok(())
    }
}

/// What the consume loop should do with a delivery
#[derive(Debug)]
pub enum MessageOutcome {
    /// Applied successfully; acknowledge
    Ack,
    /// Unprocessable body; reject without requeue so the broker
    /// dead-letters it
    Reject { reason: String },
    /// Transient failure with budget left: sleep, republish the mutated
    /// envelope, then acknowledge the original delivery
    Retry {
        envelope: EventEnvelope,
        delay: Duration,
    },
    /// Retry budget exhausted (or failure not retryable); reject without
    /// requeue
    DeadLetter {
        envelope: EventEnvelope,
        error: String,
    },
}

/// Decide the fate of one delivery.
pub async fn handle_message(
    projector: &dyn Projector,
    body: &[u8],
    schedule: &[Duration],
) -> MessageOutcome {
    let mut envelope = match EventEnvelope::parse(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return MessageOutcome::Reject {
                reason: e.to_string(),
            }
        }
    };

    let error = match projector.apply(&envelope).await {
        Ok(()) => return MessageOutcome::Ack,
        Err(e) => e,
    };

    let attempts_used = envelope.retry_count as usize;
    if error.is_retryable() && attempts_used < schedule.len() {
        let delay = schedule[attempts_used];
        envelope.retry_count += 1;
        envelope.last_error = Some(error.to_string());
        envelope.last_retry_at = Some(Utc::now());
        MessageOutcome::Retry { envelope, delay }
    } else {
        envelope.final_error = Some(error.to_string());
        envelope.failed_at = Some(Utc::now());
        MessageOutcome::DeadLetter {
            envelope,
            error: error.to_string(),
        }
    }
}
