//! Aggregated service health endpoint
//!
//! Combines the orchestrator's graph and vector probes with the broker
//! probe. The service keeps serving while degraded, so the endpoint
//! answers 200 with the status in the body unless everything is down.

use actix_web::{web, HttpResponse};

use shopgraph_core::health::{AggregatedHealth, ComponentHealth, HealthStatus};

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let stores = state.orchestrator.health().await;

    let broker_health = state.broker.health().await;
    let broker_component = match broker_health.status {
        HealthStatus::Healthy => ComponentHealth::healthy("broker").with_detail(
            serde_json::to_value(&broker_health.queues).unwrap_or(serde_json::Value::Null),
        ),
        _ => ComponentHealth::unhealthy(
            "broker",
            broker_health
                .error
                .unwrap_or_else(|| "broker unreachable".to_string()),
        ),
    };

    let mut components = stores.components;
    components.push(broker_component);
    let aggregated = AggregatedHealth::from_components(components);

    match aggregated.status {
        HealthStatus::Unhealthy => HttpResponse::ServiceUnavailable().json(aggregated),
        _ => HttpResponse::Ok().json(aggregated),
    }
}
