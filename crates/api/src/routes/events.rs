//! Event admission endpoints

use actix_web::{web, HttpRequest, HttpResponse};

use shopgraph_ingest::EventDraft;

use crate::error::ApiError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/events")
            .route("", web::post().to(create_event))
            .route("/batch", web::post().to(create_batch)),
    );
}

/// Extract a bearer token from the Authorization header, if any.
pub fn bearer_token(request: &HttpRequest) -> Option<String> {
    request
        .headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn create_event(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Json<EventDraft>,
) -> Result<HttpResponse, ApiError> {
    let token = bearer_token(&request);
    let admitted = state
        .admission
        .submit(body.into_inner(), token.as_deref())
        .await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": admitted.status.message(),
        "data": admitted.envelope,
    })))
}

async fn create_batch(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Json<Vec<EventDraft>>,
) -> Result<HttpResponse, ApiError> {
    let token = bearer_token(&request);
    let admitted = state
        .admission
        .submit_batch(body.into_inner(), token.as_deref())
        .await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": admitted.status.message(),
        "count": admitted.count,
    })))
}
