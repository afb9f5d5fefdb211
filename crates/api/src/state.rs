//! Shared application state

use std::sync::Arc;

use shopgraph_broker::BrokerClient;
use shopgraph_ingest::AdmissionService;
use shopgraph_orchestrator::Orchestrator;

/// Handles shared by every request. All are constructed once at startup
/// and internally thread-safe.
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionService>,
    pub orchestrator: Arc<Orchestrator>,
    pub broker: Arc<BrokerClient>,
}

impl AppState {
    pub fn new(
        admission: Arc<AdmissionService>,
        orchestrator: Arc<Orchestrator>,
        broker: Arc<BrokerClient>,
    ) -> Self {
        Self {
            admission,
            orchestrator,
            broker,
        }
    }
}
