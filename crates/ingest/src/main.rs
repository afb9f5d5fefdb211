//! Projector worker entry point
//!
//! Usage: shopgraph-worker <graph|vector|batch>
//!
//! Runs one long-lived consumer against the corresponding queue.
//! Parallelism comes from running more worker processes; workers share no
//! state and coordinate only through the broker.

use std::sync::Arc;

use tracing::info;

use shopgraph_broker::BrokerClient;
use shopgraph_core::config::{
    load_dotenv, BrokerConfig, ConfigLoader, GraphConfig, QueueConfig, WorkerConfig,
};
use shopgraph_core::shutdown::ShutdownCoordinator;
use shopgraph_graph::InteractionStore;
use shopgraph_ingest::{BatchProjector, GraphProjector, ProjectorWorker, VectorProjector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "graph".to_string());

    let broker_config = BrokerConfig::from_env()?;
    broker_config.validate()?;
    let queue_config = QueueConfig::from_env()?;
    queue_config.validate()?;
    let worker_config = WorkerConfig::from_env()?;
    worker_config.validate()?;

    let broker = Arc::new(BrokerClient::new(broker_config, queue_config));
    broker.setup().await?;

    let coordinator = ShutdownCoordinator::new();
    coordinator.trigger_on_ctrl_c();
    let handle = coordinator.handle();

    info!(mode = %mode, "starting projector worker");

    match mode.as_str() {
        "graph" => {
            let graph = connect_graph().await?;
            let worker = ProjectorWorker::new(
                broker,
                Arc::new(GraphProjector::new(graph)),
                &worker_config,
            );
            worker.run(handle).await?;
        }
        "vector" => {
            let worker =
                ProjectorWorker::new(broker, Arc::new(VectorProjector), &worker_config);
            worker.run(handle).await?;
        }
        "batch" => {
            let graph = connect_graph().await?;
            let worker = BatchProjector::new(broker, graph, &worker_config);
            worker.run(handle).await?;
        }
        other => anyhow::bail!("unknown worker mode '{other}', expected graph|vector|batch"),
    }

    Ok(())
}

async fn connect_graph() -> anyhow::Result<Arc<InteractionStore>> {
    let config = GraphConfig::from_env()?;
    config.validate()?;
    let store = InteractionStore::connect(&config).await?;
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}
