//! Error-kind to HTTP status mapping

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use shopgraph_core::error::ShopGraphError;

/// Wrapper giving platform errors an HTTP shape
#[derive(Debug)]
pub struct ApiError(pub ShopGraphError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<ShopGraphError> for ApiError {
    fn from(error: ShopGraphError) -> Self {
        Self(error)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            ShopGraphError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ShopGraphError::NotFound { .. } => StatusCode::NOT_FOUND,
            ShopGraphError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ShopGraphError::BackendFailure { .. } => StatusCode::BAD_GATEWAY,
            ShopGraphError::Exhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            ShopGraphError::Internal { .. }
            | ShopGraphError::Configuration { .. }
            | ShopGraphError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "detail": self.0.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ShopGraphError::invalid_input("bad"), 400),
            (ShopGraphError::not_found("product 1"), 404),
            (ShopGraphError::unavailable("broker", "down"), 503),
            (ShopGraphError::backend("graph", "boom"), 502),
            (
                ShopGraphError::Exhausted {
                    message: "retries".into(),
                },
                429,
            ),
            (ShopGraphError::internal("bug"), 500),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_code().as_u16(), expected);
        }
    }
}
