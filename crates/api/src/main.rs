//! ShopGraph API service
//!
//! Wires the graph store, vector index, broker, admission, and
//! orchestrator together and serves the control surface.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing::{info, warn};

use shopgraph_api::{routes, AppState};
use shopgraph_broker::BrokerClient;
use shopgraph_core::config::{
    load_dotenv, BrokerConfig, ConfigLoader, EmbeddingConfig, GraphConfig, QueueConfig,
    RecommendConfig, ServiceConfig, VectorConfig,
};
use shopgraph_graph::InteractionStore;
use shopgraph_ingest::{AdmissionService, NoAuthIdentity};
use shopgraph_orchestrator::Orchestrator;
use shopgraph_vector::VectorStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let service_config = ServiceConfig::from_env()?;
    service_config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(service_config.log_level.clone())
            }),
        )
        .json()
        .init();

    let graph_config = GraphConfig::from_env()?;
    graph_config.validate()?;
    let vector_config = VectorConfig::from_env()?;
    vector_config.validate()?;
    let embedding_config = EmbeddingConfig::from_env()?;
    embedding_config.validate()?;
    let broker_config = BrokerConfig::from_env()?;
    broker_config.validate()?;
    let queue_config = QueueConfig::from_env()?;
    queue_config.validate()?;
    let recommend_config = RecommendConfig::from_env()?;
    recommend_config.validate()?;

    let graph = Arc::new(InteractionStore::connect(&graph_config).await?);
    graph.ensure_schema().await?;

    let vector = Arc::new(VectorStore::connect(&vector_config, &embedding_config)?);
    let broker = Arc::new(BrokerClient::new(broker_config, queue_config));
    if service_config.use_broker {
        // The broker reconnects lazily; a missing broker at boot only
        // delays the async pipeline.
        if let Err(e) = broker.setup().await {
            warn!(error = %e, "broker setup failed; will retry on first publish");
        }
    }

    let admission = Arc::new(AdmissionService::new(
        graph.clone(),
        broker.clone(),
        Arc::new(NoAuthIdentity),
        service_config.use_broker,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        graph.clone(),
        vector.clone(),
        recommend_config,
    ));

    let state = AppState::new(admission, orchestrator, broker);

    info!(
        host = %service_config.host,
        port = service_config.port,
        use_broker = service_config.use_broker,
        "starting ShopGraph API"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .workers(service_config.workers)
    .bind((service_config.host.as_str(), service_config.port))?
    .run()
    .await?;

    Ok(())
}
