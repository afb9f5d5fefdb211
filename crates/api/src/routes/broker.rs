//! Broker introspection and management endpoints

use actix_web::{web, HttpResponse};

use shopgraph_broker::known_queues;
use shopgraph_core::error::ShopGraphError;
use shopgraph_core::health::HealthStatus;

use crate::error::ApiError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/rabbitmq")
            .route("/health", web::get().to(health))
            .route("/queues/{name}", web::get().to(queue_info))
            .route("/queues/{name}/purge", web::post().to(purge_queue)),
    );
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let health = state.broker.health().await;
    match health.status {
        HealthStatus::Healthy => HttpResponse::Ok().json(health),
        _ => HttpResponse::ServiceUnavailable().json(health),
    }
}

fn validate_queue(name: &str) -> Result<(), ApiError> {
    if known_queues().contains(&name) {
        Ok(())
    } else {
        Err(ShopGraphError::invalid_input(format!(
            "invalid queue name '{name}', valid queues: {}",
            known_queues().join(", ")
        ))
        .into())
    }
}

async fn queue_info(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    validate_queue(&name)?;
    let info = state.broker.queue_info(&name).await?;
    Ok(HttpResponse::Ok().json(info))
}

async fn purge_queue(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    validate_queue(&name)?;
    let purged = state.broker.purge(&name).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Purged queue: {name}"),
        "purged": purged,
    })))
}
