//! Event admission
//!
//! Validates incoming event drafts, normalizes timestamps to UTC second
//! precision, resolves the caller identity from a bearer token when one is
//! supplied, and dispatches either to the broker (async pipeline) or
//! straight to the graph store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shopgraph_broker::EventBus;
use shopgraph_core::error::{Result, ShopGraphError};
use shopgraph_core::events::{event_time_format, truncate_to_second, EventEnvelope, EventType};
use shopgraph_graph::{Interaction, InteractionStore};

/// Incoming event as accepted at the admission boundary
#[derive(Debug, Clone, Deserialize)]
pub struct EventDraft {
    /// Defaults to now (UTC) when absent; microseconds are zeroed
    #[serde(default, with = "event_time_format::option")]
    pub event_time: Option<DateTime<Utc>>,
    pub event_type: EventType,
    pub product_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub user_session: String,
}

/// Seam over the graph store's write path
#[async_trait]
pub trait GraphWriter: Send + Sync {
    async fn record_interaction(&self, interaction: &Interaction) -> Result<()>;
    async fn record_batch(&self, interactions: &[Interaction]) -> Result<u64>;
}

#[async_trait]
impl GraphWriter for InteractionStore {
    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        InteractionStore::record_interaction(self, interaction).await
    }

    async fn record_batch(&self, interactions: &[Interaction]) -> Result<u64> {
        InteractionStore::record_batch(self, interactions).await
    }
}

/// Resolves a bearer token to a caller id. Token verification itself is
/// external; the resolved id overrides any `user_id` in the draft.
pub trait CallerIdentity: Send + Sync {
    fn resolve(&self, token: &str) -> Result<i64>;
}

/// Identity resolver for deployments without an auth layer: any supplied
/// token is rejected rather than silently trusted.
pub struct NoAuthIdentity;

impl CallerIdentity for NoAuthIdentity {
    fn resolve(&self, _token: &str) -> Result<i64> {
        Err(ShopGraphError::invalid_input(
            "token resolution is not configured",
        ))
    }
}

/// How the event was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Queued,
    Recorded,
}

impl AdmissionStatus {
    pub fn message(&self) -> &'static str {
        match self {
            AdmissionStatus::Queued => "Event queued for processing",
            AdmissionStatus::Recorded => "Event recorded",
        }
    }
}

/// Outcome of single-event admission
#[derive(Debug, Clone, Serialize)]
pub struct Admitted {
    pub status: AdmissionStatus,
    pub envelope: EventEnvelope,
}

/// Outcome of batch admission
#[derive(Debug, Clone, Serialize)]
pub struct BatchAdmitted {
    pub status: AdmissionStatus,
    pub count: u64,
}

/// Admission service dispatching events to the broker or the graph store
pub struct AdmissionService {
    graph: Arc<dyn GraphWriter>,
    bus: Arc<dyn EventBus>,
    identity: Arc<dyn CallerIdentity>,
    use_broker: bool,
}

impl AdmissionService {
    pub fn new(
        graph: Arc<dyn GraphWriter>,
        bus: Arc<dyn EventBus>,
        identity: Arc<dyn CallerIdentity>,
        use_broker: bool,
    ) -> Self {
        Self {
            graph,
            bus,
            identity,
            use_broker,
        }
    }

    /// Admit a single event. A bearer token, when present, overrides the
    /// draft's `user_id`; an event with no resolvable user id is invalid.
    pub async fn submit(&self, draft: EventDraft, token: Option<&str>) -> Result<Admitted> {
        let user_id = self
            .effective_user(draft.user_id, token)?
            .ok_or_else(|| ShopGraphError::invalid_input("user_id is required"))?;
        let envelope = build_envelope(&draft, user_id);

        if self.use_broker {
            if let Err(e) = self.bus.publish(&envelope).await {
                warn!(error = %e, "failed to queue event");
                return Err(ShopGraphError::unavailable("broker", e.to_string()));
            }
            debug!(user_id, product_id = envelope.product_id, "event queued");
            Ok(Admitted {
                status: AdmissionStatus::Queued,
                envelope,
            })
        } else {
            let interaction = interaction_from(&envelope);
            self.graph.record_interaction(&interaction).await?;
            debug!(user_id, product_id = envelope.product_id, "event recorded");
            Ok(Admitted {
                status: AdmissionStatus::Recorded,
                envelope,
            })
        }
    }

    /// Admit a batch. Elements missing a resolvable user id are skipped;
    /// an entirely skipped batch is invalid. Direct mode writes the batch
    /// in one transaction; broker mode publishes each envelope.
    pub async fn submit_batch(
        &self,
        drafts: Vec<EventDraft>,
        token: Option<&str>,
    ) -> Result<BatchAdmitted> {
        let default_user = match token {
            Some(token) => Some(self.identity.resolve(token)?),
            None => None,
        };

        let envelopes: Vec<EventEnvelope> = drafts
            .iter()
            .filter_map(|draft| {
                let user_id = draft.user_id.or(default_user)?;
                Some(build_envelope(draft, user_id))
            })
            .collect();

        if envelopes.is_empty() {
            return Err(ShopGraphError::invalid_input("no valid events to record"));
        }

        if self.use_broker {
            let published = self.bus_publish_batch(&envelopes).await?;
            Ok(BatchAdmitted {
                status: AdmissionStatus::Queued,
                count: published,
            })
        } else {
            let interactions: Vec<Interaction> = envelopes.iter().map(interaction_from).collect();
            let count = self.graph.record_batch(&interactions).await?;
            Ok(BatchAdmitted {
                status: AdmissionStatus::Recorded,
                count,
            })
        }
    }

    fn effective_user(&self, draft_user: Option<i64>, token: Option<&str>) -> Result<Option<i64>> {
        match token {
            Some(token) => Ok(Some(self.identity.resolve(token)?)),
            None => Ok(draft_user),
        }
    }

    async fn bus_publish_batch(&self, envelopes: &[EventEnvelope]) -> Result<u64> {
        let mut published = 0u64;
        for envelope in envelopes {
            match self.bus.publish(envelope).await {
                Ok(()) => published += 1,
                Err(e) => warn!(error = %e, "failed to queue event in batch"),
            }
        }
        if published == 0 {
            return Err(ShopGraphError::unavailable(
                "broker",
                "no events could be queued",
            ));
        }
        Ok(published)
    }
}

fn build_envelope(draft: &EventDraft, user_id: i64) -> EventEnvelope {
    let event_time = truncate_to_second(draft.event_time.unwrap_or_else(Utc::now));
    EventEnvelope::new(
        event_time,
        draft.event_type,
        draft.product_id,
        user_id,
        draft.user_session.clone(),
    )
}

pub(crate) fn interaction_from(envelope: &EventEnvelope) -> Interaction {
    Interaction::new(
        envelope.user_id,
        envelope.product_id,
        envelope.event_type,
        envelope.event_time,
        Some(envelope.user_session.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct RecordingSink {
        interactions: Mutex<Vec<Interaction>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                interactions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GraphWriter for RecordingSink {
        async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
            self.interactions.lock().await.push(interaction.clone());
            Ok(())
        }

        async fn record_batch(&self, interactions: &[Interaction]) -> Result<u64> {
            let mut guard = self.interactions.lock().await;
            guard.extend_from_slice(interactions);
            Ok(interactions.len() as u64)
        }
    }

    struct RecordingBus {
        published: Mutex<Vec<EventEnvelope>>,
        fail: bool,
    }

    impl RecordingBus {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
            if self.fail {
                return Err(ShopGraphError::unavailable("broker", "connection refused"));
            }
            self.published.lock().await.push(envelope.clone());
            Ok(())
        }
    }

    struct FixedIdentity(i64);

    impl CallerIdentity for FixedIdentity {
        fn resolve(&self, _token: &str) -> Result<i64> {
            Ok(self.0)
        }
    }

    fn draft(user_id: Option<i64>, product_id: i64) -> EventDraft {
        EventDraft {
            event_time: None,
            event_type: EventType::View,
            product_id,
            user_id,
            user_session: "s-1".to_string(),
        }
    }

    fn service(
        sink: Arc<RecordingSink>,
        bus: Arc<RecordingBus>,
        use_broker: bool,
    ) -> AdmissionService {
        AdmissionService::new(sink, bus, Arc::new(FixedIdentity(900)), use_broker)
    }

    #[tokio::test]
    async fn test_direct_mode_writes_exactly_one_edge() {
        let sink = RecordingSink::new();
        let bus = RecordingBus::new(false);
        let admission = service(sink.clone(), bus.clone(), false);

        let admitted = admission.submit(draft(Some(1), 7), None).await.unwrap();
        assert_eq!(admitted.status, AdmissionStatus::Recorded);
        assert_eq!(admitted.status.message(), "Event recorded");

        let written = sink.interactions.lock().await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].user_id, 1);
        assert_eq!(written[0].product_id, 7);
        assert_eq!(written[0].event_time.timestamp_subsec_micros(), 0);
        assert!(bus.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_broker_mode_publishes_instead_of_writing() {
        let sink = RecordingSink::new();
        let bus = RecordingBus::new(false);
        let admission = service(sink.clone(), bus.clone(), true);

        let admitted = admission.submit(draft(Some(1), 7), None).await.unwrap();
        assert_eq!(admitted.status, AdmissionStatus::Queued);

        assert!(sink.interactions.lock().await.is_empty());
        let published = bus.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_token_overrides_draft_user_id() {
        let sink = RecordingSink::new();
        let bus = RecordingBus::new(false);
        let admission = service(sink.clone(), bus, false);

        admission
            .submit(draft(Some(1), 7), Some("bearer-token"))
            .await
            .unwrap();
        assert_eq!(sink.interactions.lock().await[0].user_id, 900);
    }

    #[tokio::test]
    async fn test_missing_user_id_is_invalid() {
        let admission = service(RecordingSink::new(), RecordingBus::new(false), false);
        let err = admission.submit(draft(None, 7), None).await.unwrap_err();
        assert!(matches!(err, ShopGraphError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_as_unavailable() {
        let admission = service(RecordingSink::new(), RecordingBus::new(true), true);
        let err = admission.submit(draft(Some(1), 7), None).await.unwrap_err();
        assert!(matches!(err, ShopGraphError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_batch_inherits_token_identity() {
        let sink = RecordingSink::new();
        let admission = service(sink.clone(), RecordingBus::new(false), false);

        let admitted = admission
            .submit_batch(vec![draft(None, 7), draft(Some(2), 8)], Some("token"))
            .await
            .unwrap();
        assert_eq!(admitted.count, 2);

        let written = sink.interactions.lock().await;
        assert_eq!(written[0].user_id, 900);
        assert_eq!(written[1].user_id, 2);
    }

    #[tokio::test]
    async fn test_batch_skips_unresolvable_elements() {
        let sink = RecordingSink::new();
        let admission = service(sink.clone(), RecordingBus::new(false), false);

        let admitted = admission
            .submit_batch(vec![draft(None, 7), draft(Some(2), 8)], None)
            .await
            .unwrap();
        assert_eq!(admitted.count, 1);
        assert_eq!(sink.interactions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_with_no_valid_elements_is_invalid() {
        let admission = service(RecordingSink::new(), RecordingBus::new(false), false);
        let err = admission
            .submit_batch(vec![draft(None, 7), draft(None, 8)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopGraphError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_batch_broker_mode_publishes_each() {
        let bus = RecordingBus::new(false);
        let admission = service(RecordingSink::new(), bus.clone(), true);

        let admitted = admission
            .submit_batch(vec![draft(Some(1), 7), draft(Some(1), 8)], None)
            .await
            .unwrap();
        assert_eq!(admitted.status, AdmissionStatus::Queued);
        assert_eq!(admitted.count, 2);
        assert_eq!(bus.published.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_auth_identity_rejects_tokens() {
        let admission = AdmissionService::new(
            RecordingSink::new(),
            RecordingBus::new(false),
            Arc::new(NoAuthIdentity),
            false,
        );
        let err = admission
            .submit(draft(Some(1), 7), Some("token"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopGraphError::InvalidInput { .. }));
    }

    #[test]
    fn test_draft_parses_wire_timestamp() {
        let draft: EventDraft = serde_json::from_str(
            r#"{"event_time":"2025-01-30 10:15:00","event_type":"purchase",
                "product_id":12345,"user_id":678,"user_session":"s-abc"}"#,
        )
        .unwrap();
        assert_eq!(draft.event_time.unwrap().timestamp_subsec_micros(), 0);
        assert_eq!(draft.event_type, EventType::Purchase);
    }

    #[test]
    fn test_draft_rejects_unknown_event_type() {
        let result: std::result::Result<EventDraft, _> = serde_json::from_str(
            r#"{"event_type":"wishlist","product_id":1,"user_session":"s"}"#,
        );
        assert!(result.is_err());
    }
}
