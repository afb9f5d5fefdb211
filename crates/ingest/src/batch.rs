//! Batch projector
//!
//! Alternate graph projector that buffers decoded events and writes them
//! through the store's transactional batch insert, flushing when the
//! buffer reaches `batch_size` or `flush_interval` elapses. Deliveries
//! are acknowledged only after their batch commits; a failed flush
//! requeues the whole buffer. The residual buffer is flushed once on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use tracing::{error, info, warn};

use shopgraph_broker::{BrokerClient, GRAPH_QUEUE};
use shopgraph_core::config::WorkerConfig;
use shopgraph_core::error::Result;
use shopgraph_core::events::EventEnvelope;
use shopgraph_core::shutdown::ShutdownHandle;

use shopgraph_graph::Interaction;

use crate::admission::{interaction_from, GraphWriter};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Buffering projector over the graph queue
pub struct BatchProjector {
    broker: Arc<BrokerClient>,
    graph: Arc<dyn GraphWriter>,
    batch_size: usize,
    flush_interval: Duration,
}

struct Buffered {
    interaction: Interaction,
    acker: Acker,
}

impl BatchProjector {
    pub fn new(
        broker: Arc<BrokerClient>,
        graph: Arc<dyn GraphWriter>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            broker,
            graph,
            batch_size: config.batch_size,
            flush_interval: config.batch_interval,
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownHandle) -> Result<()> {
        info!(
            batch_size = self.batch_size,
            interval_secs = self.flush_interval.as_secs(),
            "batch projector starting"
        );

        let mut buffer: Vec<Buffered> = Vec::with_capacity(self.batch_size);

        while !shutdown.is_cancelled() {
            // Prefetch must cover a full batch or the buffer can never fill.
            let prefetch = self.batch_size.min(u16::MAX as usize) as u16;
            let mut consumer = match self.broker.consumer(GRAPH_QUEUE, prefetch).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(error = %e, "consumer setup failed; retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => continue,
                    }
                }
            };

            let mut ticker = tokio::time::interval(self.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.reset();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.flush(&mut buffer).await;
                        info!("batch projector stopping");
                        return Ok(());
                    }
                    _ = ticker.tick() => {
                        self.flush(&mut buffer).await;
                    }
                    next = consumer.next() => match next {
                        Some(Ok(delivery)) => {
                            match EventEnvelope::parse(&delivery.data) {
                                Ok(envelope) => {
                                    buffer.push(Buffered {
                                        interaction: interaction_from(&envelope),
                                        acker: delivery.acker,
                                    });
                                    if buffer.len() >= self.batch_size {
                                        self.flush(&mut buffer).await;
                                        ticker.reset();
                                    }
                                }
                                Err(e) => {
                                    warn!(reason = %e, "rejecting unprocessable message");
                                    let options = BasicRejectOptions { requeue: false };
                                    if let Err(e) = delivery.acker.reject(options).await {
                                        warn!(error = %e, "failed to reject delivery");
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "delivery error; reconnecting");
                            break;
                        }
                        None => {
                            warn!("consumer stream ended; reconnecting");
                            break;
                        }
                    }
                }
            }

            // The buffered ackers belong to the dead channel; requeue
            // happens via broker redelivery of the unacked messages.
            buffer.clear();
        }

        self.flush(&mut buffer).await;
        info!("batch projector stopped");
        Ok(())
    }

    /// Write the buffer in one transaction, then ack every delivery it
    /// contained. On failure the deliveries are requeued instead.
    async fn flush(&self, buffer: &mut Vec<Buffered>) {
        if buffer.is_empty() {
            return;
        }
        let batch: Vec<Buffered> = buffer.drain(..).collect();
        let interactions: Vec<Interaction> =
            batch.iter().map(|b| b.interaction.clone()).collect();

        match self.graph.record_batch(&interactions).await {
            Ok(count) => {
                info!(count, "flushed interaction batch");
                for buffered in batch {
                    if let Err(e) = buffered.acker.ack(BasicAckOptions::default()).await {
                        warn!(error = %e, "failed to ack batched delivery");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, size = interactions.len(), "batch flush failed; requeueing");
                for buffered in batch {
                    let options = BasicRejectOptions { requeue: true };
                    if let Err(e) = buffered.acker.reject(options).await {
                        warn!(error = %e, "failed to requeue batched delivery");
                    }
                }
            }
        }
    }
}
