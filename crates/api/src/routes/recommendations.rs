//! Orchestrated recommendation endpoints

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use shopgraph_orchestrator::RecommendationRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orchestrator")
            .route(
                "/recommendations/{user_id}",
                web::get().to(get_recommendations),
            )
            .route("/recommendations", web::post().to(post_recommendations))
            .route("/for-you", web::post().to(for_you))
            .route("/user-mode/{user_id}", web::get().to(user_mode)),
    );
}

#[derive(Debug, Deserialize)]
struct RecommendQuery {
    limit: Option<usize>,
    mmr_diversity: Option<f32>,
    include_reasons: Option<bool>,
}

async fn get_recommendations(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<RecommendQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut request = RecommendationRequest::for_user(path.into_inner());
    if let Some(limit) = query.limit {
        request.limit = limit;
    }
    request.mmr_diversity = query.mmr_diversity;
    request.include_reasons = query.include_reasons.unwrap_or(true);

    let response = state.orchestrator.recommend(request).await;
    Ok(HttpResponse::Ok().json(response))
}

async fn post_recommendations(
    state: web::Data<AppState>,
    body: web::Json<RecommendationRequest>,
) -> Result<HttpResponse, ApiError> {
    let response = state.orchestrator.recommend(body.into_inner()).await;
    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Deserialize)]
struct ForYouRequest {
    user_id: i64,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
    #[serde(default)]
    mmr_diversity: Option<f32>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

async fn for_you(
    state: web::Data<AppState>,
    body: web::Json<ForYouRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let response = state
        .orchestrator
        .for_you(
            request.user_id,
            request.page,
            request.page_size,
            request.mmr_diversity,
        )
        .await;
    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Deserialize)]
struct UserModeQuery {
    lookback_hours: Option<i64>,
}

async fn user_mode(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<UserModeQuery>,
) -> Result<HttpResponse, ApiError> {
    let response = state
        .orchestrator
        .user_mode(path.into_inner(), query.lookback_hours)
        .await;
    Ok(HttpResponse::Ok().json(response))
}
