//! RabbitMQ broker adapter
//!
//! Owns the event topology: a durable fanout exchange copies every
//! admitted event to the two projector queues; exhausted or rejected
//! messages dead-letter through a direct exchange into the DLQ.
//!
//! The publish channel is confined behind a mutex so a single channel is
//! never used by concurrent callers; consumers get a dedicated channel
//! each. The connection is established lazily and re-established on the
//! next call after a failure.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopgraph_core::config::{BrokerConfig, QueueConfig};
use shopgraph_core::error::{Result, ShopGraphError};
use shopgraph_core::events::EventEnvelope;
use shopgraph_core::health::HealthStatus;

/// Fanout exchange every event is published to
pub const EVENTS_EXCHANGE: &str = "events";
/// Direct dead-letter exchange
pub const DLX_EXCHANGE: &str = "events.dlx";
/// Routing key binding the DLQ to the dead-letter exchange
pub const DLQ_ROUTING_KEY: &str = "dlq";
/// Queue feeding the graph projector
pub const GRAPH_QUEUE: &str = "events.graph";
/// Queue feeding the vector projector
pub const VECTOR_QUEUE: &str = "events.qdrant";
/// Terminal queue for exhausted and rejected messages
pub const DLQ: &str = "events.dlq";

/// The queues the control surface may introspect or purge.
pub fn known_queues() -> [&'static str; 3] {
    [GRAPH_QUEUE, VECTOR_QUEUE, DLQ]
}

/// Seam for publishing envelopes; the admission service and projector
/// workers depend on this rather than the concrete client.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Queue depth and consumer count
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub queue: String,
    pub messages: u32,
    pub consumers: u32,
}

/// Broker health report
#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    pub status: HealthStatus,
    pub host: String,
    pub port: u16,
    pub queues: HashMap<String, QueueInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct ConnState {
    connection: Connection,
    channel: Channel,
}

/// Client over the event broker
pub struct BrokerClient {
    config: BrokerConfig,
    queues: QueueConfig,
    state: Mutex<Option<ConnState>>,
}

impl BrokerClient {
    pub fn new(config: BrokerConfig, queues: QueueConfig) -> Self {
        Self {
            config,
            queues,
            state: Mutex::new(None),
        }
    }

    /// Connect (if needed) and declare the full topology. Declaration is
    /// idempotent; services call this at startup.
    pub async fn setup(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        self.connected(&mut guard).await?;
        Ok(())
    }

    /// Publish one envelope to the fanout exchange as a persistent JSON
    /// message, stamping `published_at`.
    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut stamped = envelope.clone();
        stamped.published_at = Some(Utc::now());
        let body = serde_json::to_vec(&stamped)?;

        let mut guard = self.state.lock().await;
        self.connected(&mut guard).await?;
        let state = guard
            .as_ref()
            .ok_or_else(|| ShopGraphError::internal("broker state missing after connect"))?;

        state
            .channel
            .basic_publish(
                EVENTS_EXCHANGE,
                "",
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(broker_err)?
            .await
            .map_err(broker_err)?;

        debug!(event_type = %stamped.event_type, product_id = stamped.product_id, "published event");
        Ok(())
    }

    /// Publish a batch, returning how many envelopes made it out. A
    /// failing envelope is logged and skipped rather than aborting the
    /// rest.
    pub async fn publish_batch(&self, envelopes: &[EventEnvelope]) -> Result<usize> {
        let mut published = 0;
        for envelope in envelopes {
            match self.publish(envelope).await {
                Ok(()) => published += 1,
                Err(e) => warn!(error = %e, "failed to publish event in batch"),
            }
        }
        info!(published, total = envelopes.len(), "published event batch");
        Ok(published)
    }

    /// Start a manual-ack consumer on a queue with the given prefetch.
    /// The consumer gets its own channel so deliveries never share the
    /// publish channel.
    pub async fn consumer(&self, queue: &str, prefetch: u16) -> Result<Consumer> {
        let channel = {
            let mut guard = self.state.lock().await;
            self.connected(&mut guard).await?;
            let state = guard
                .as_ref()
                .ok_or_else(|| ShopGraphError::internal("broker state missing after connect"))?;
            state.connection.create_channel().await.map_err(broker_err)?
        };

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(broker_err)?;

        let tag = format!("{queue}-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)?;

        info!(queue, prefetch, consumer_tag = %tag, "started consumer");
        Ok(consumer)
    }

    /// Queue depth and consumer count via passive declare.
    pub async fn queue_info(&self, queue: &str) -> Result<QueueInfo> {
        let channel = self.scoped_channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)?;
        let info = QueueInfo {
            queue: queue.to_string(),
            messages: declared.message_count(),
            consumers: declared.consumer_count(),
        };
        let _ = channel.close(200, "introspection done").await;
        Ok(info)
    }

    /// Drop every message in a queue. Returns the purged count.
    pub async fn purge(&self, queue: &str) -> Result<u32> {
        let channel = self.scoped_channel().await?;
        let purged = channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await
            .map_err(broker_err)?;
        let _ = channel.close(200, "purge done").await;
        warn!(queue, purged, "purged queue");
        Ok(purged)
    }

    /// Connection status plus depth and consumer counts for the known
    /// queues.
    pub async fn health(&self) -> BrokerHealth {
        let mut queues = HashMap::new();
        for queue in known_queues() {
            match self.queue_info(queue).await {
                Ok(info) => {
                    queues.insert(queue.to_string(), info);
                }
                Err(e) => {
                    return BrokerHealth {
                        status: HealthStatus::Unhealthy,
                        host: self.config.host.clone(),
                        port: self.config.port,
                        queues,
                        error: Some(e.to_string()),
                    }
                }
            }
        }
        BrokerHealth {
            status: HealthStatus::Healthy,
            host: self.config.host.clone(),
            port: self.config.port,
            queues,
            error: None,
        }
    }

    /// Reconnect if the connection is absent or dead, declaring the
    /// topology on every fresh connection.
    async fn connected(&self, state: &mut Option<ConnState>) -> Result<()> {
        let alive = state
            .as_ref()
            .map(|s| s.connection.status().connected())
            .unwrap_or(false);
        if alive {
            return Ok(());
        }

        let connection = Connection::connect(
            &self.config.amqp_uri(),
            ConnectionProperties::default(),
        )
        .await
        .map_err(broker_err)?;
        let channel = connection.create_channel().await.map_err(broker_err)?;
        declare_topology(&channel, &self.queues).await?;

        info!(host = %self.config.host, port = self.config.port, "connected to broker");
        *state = Some(ConnState {
            connection,
            channel,
        });
        Ok(())
    }

    /// A throwaway channel for introspection, so a failed passive declare
    /// cannot poison the publish channel.
    async fn scoped_channel(&self) -> Result<Channel> {
        let mut guard = self.state.lock().await;
        self.connected(&mut guard).await?;
        let state = guard
            .as_ref()
            .ok_or_else(|| ShopGraphError::internal("broker state missing after connect"))?;
        state.connection.create_channel().await.map_err(broker_err)
    }
}

#[async_trait]
impl EventBus for BrokerClient {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        BrokerClient::publish(self, envelope).await
    }
}

/// Declare exchanges, queues, and bindings. Safe to call repeatedly.
pub async fn declare_topology(channel: &Channel, queues: &QueueConfig) -> Result<()> {
    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Direct,
            durable_exchange(),
            FieldTable::default(),
        )
        .await
        .map_err(broker_err)?;
    channel
        .queue_declare(
            DLQ,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            dlq_args(queues),
        )
        .await
        .map_err(broker_err)?;
    channel
        .queue_bind(
            DLQ,
            DLX_EXCHANGE,
            DLQ_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(broker_err)?;

    channel
        .exchange_declare(
            EVENTS_EXCHANGE,
            ExchangeKind::Fanout,
            durable_exchange(),
            FieldTable::default(),
        )
        .await
        .map_err(broker_err)?;

    for queue in [GRAPH_QUEUE, VECTOR_QUEUE] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                primary_queue_args(queues),
            )
            .await
            .map_err(broker_err)?;
        channel
            .queue_bind(
                queue,
                EVENTS_EXCHANGE,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)?;
    }

    info!("declared broker topology");
    Ok(())
}

fn durable_exchange() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    }
}

/// Arguments for the primary projector queues: message TTL, dead-letter
/// routing, and a length cap that overflows into the DLX.
pub fn primary_queue_args(config: &QueueConfig) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(config.primary_ttl_ms));
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DLQ_ROUTING_KEY.into()),
    );
    args.insert(
        "x-max-length".into(),
        AMQPValue::LongLongInt(config.primary_max_length),
    );
    args
}

/// Arguments for the dead-letter queue: retention TTL only.
pub fn dlq_args(config: &QueueConfig) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(config.dlq_ttl_ms));
    args
}

fn broker_err(error: lapin::Error) -> ShopGraphError {
    match &error {
        lapin::Error::IOError(_)
        | lapin::Error::InvalidConnectionState(_)
        | lapin::Error::InvalidChannelState(_) => {
            ShopGraphError::unavailable("broker", error.to_string())
        }
        _ => ShopGraphError::backend("broker", error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(args: &FieldTable, key: &str) -> Option<AMQPValue> {
        args.inner().get(&lapin::types::ShortString::from(key)).cloned()
    }

    #[test]
    fn test_primary_queue_args_carry_dlx_routing() {
        let args = primary_queue_args(&QueueConfig::default());
        assert_eq!(
            arg(&args, "x-message-ttl"),
            Some(AMQPValue::LongLongInt(86_400_000))
        );
        assert_eq!(
            arg(&args, "x-dead-letter-exchange"),
            Some(AMQPValue::LongString("events.dlx".into()))
        );
        assert_eq!(
            arg(&args, "x-dead-letter-routing-key"),
            Some(AMQPValue::LongString("dlq".into()))
        );
        assert_eq!(
            arg(&args, "x-max-length"),
            Some(AMQPValue::LongLongInt(100_000))
        );
    }

    #[test]
    fn test_dlq_args_retention() {
        let args = dlq_args(&QueueConfig::default());
        assert_eq!(
            arg(&args, "x-message-ttl"),
            Some(AMQPValue::LongLongInt(604_800_000))
        );
        assert!(arg(&args, "x-dead-letter-exchange").is_none());
    }

    #[test]
    fn test_known_queues_cover_the_topology() {
        let queues = known_queues();
        assert!(queues.contains(&GRAPH_QUEUE));
        assert!(queues.contains(&VECTOR_QUEUE));
        assert!(queues.contains(&DLQ));
    }
}
