//! Long-running projector consume loop
//!
//! Each worker owns one consumer on its projector's queue and handles one
//! delivery at a time up to the channel prefetch. Retry sleeps happen
//! in-process, deliberately occupying a prefetch slot as backpressure
//! against a struggling store. Workers share no state; scaling out means
//! running more worker processes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use tracing::{error, info, warn};

use shopgraph_broker::BrokerClient;
use shopgraph_core::config::WorkerConfig;
use shopgraph_core::error::Result;
use shopgraph_core::shutdown::ShutdownHandle;

use crate::projector::{handle_message, MessageOutcome, Projector};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Consume loop binding one projector to its queue
pub struct ProjectorWorker {
    broker: Arc<BrokerClient>,
    projector: Arc<dyn Projector>,
    schedule: Vec<Duration>,
    prefetch: u16,
}

impl ProjectorWorker {
    pub fn new(
        broker: Arc<BrokerClient>,
        projector: Arc<dyn Projector>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            broker,
            projector,
            schedule: config.retry_schedule.clone(),
            prefetch: config.prefetch,
        }
    }

    /// Run until shutdown. Consumer failures trigger reconnection; the
    /// broker's durable queues make resumption safe.
    pub async fn run(&self, mut shutdown: ShutdownHandle) -> Result<()> {
        let queue = self.projector.queue();
        info!(queue, prefetch = self.prefetch, "projector worker starting");

        while !shutdown.is_cancelled() {
            let mut consumer = match self.broker.consumer(queue, self.prefetch).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(queue, error = %e, "consumer setup failed; retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => continue,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(queue, "projector worker stopping");
                        return Ok(());
                    }
                    next = consumer.next() => match next {
                        Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                        Some(Err(e)) => {
                            warn!(queue, error = %e, "delivery error; reconnecting");
                            break;
                        }
                        None => {
                            warn!(queue, "consumer stream ended; reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        info!(queue, "projector worker stopped");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let outcome = handle_message(self.projector.as_ref(), &delivery.data, &self.schedule).await;
        match outcome {
            MessageOutcome::Ack => {
                ack(&delivery).await;
            }
            MessageOutcome::Reject { reason } => {
                warn!(reason = %reason, "rejecting unprocessable message");
                reject(&delivery, false).await;
            }
            MessageOutcome::Retry { envelope, delay } => {
                warn!(
                    retry = envelope.retry_count,
                    max = self.schedule.len(),
                    delay_secs = delay.as_secs(),
                    "store failure; requeueing after delay"
                );
                tokio::time::sleep(delay).await;
                match self.broker.publish(&envelope).await {
                    Ok(()) => ack(&delivery).await,
                    Err(e) => {
                        // Keep the original delivery alive; the broker
                        // will redeliver it.
                        error!(error = %e, "republish failed; requeueing original");
                        reject(&delivery, true).await;
                    }
                }
            }
            MessageOutcome::DeadLetter { error: cause, .. } => {
                error!(error = %cause, "retries exhausted; dead-lettering message");
                reject(&delivery, false).await;
            }
        }
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
        warn!(error = %e, "failed to ack delivery");
    }
}

async fn reject(delivery: &Delivery, requeue: bool) {
    let options = BasicRejectOptions { requeue };
    if let Err(e) = delivery.acker.reject(options).await {
        warn!(error = %e, "failed to reject delivery");
    }
}
