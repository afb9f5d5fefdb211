//! HTTP client for the external embedding service
//!
//! The embedding model is an external collaborator: this client only ships
//! text or an image reference to the service and validates the returned
//! vector's dimension.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use shopgraph_core::config::EmbeddingConfig;
use shopgraph_core::error::{Result, ShopGraphError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for the text and image embedding endpoints
#[derive(Clone)]
pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ShopGraphError::unavailable("embedding", e.to_string()))?;

        info!(
            url = %config.url,
            dimension = config.dimension,
            "initialized embedding client"
        );

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            dimension: config.dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a text query.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(ShopGraphError::invalid_input("text to embed is empty"));
        }
        self.post("/embed/text", &TextRequest { text }).await
    }

    /// Embed an image given a path or URL.
    pub async fn embed_image(&self, source: &str) -> Result<Vec<f32>> {
        if source.is_empty() {
            return Err(ShopGraphError::invalid_input("image source is empty"));
        }
        self.post("/embed/image", &ImageRequest { source }).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Vec<f32>> {
        let mut request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ShopGraphError::unavailable("embedding", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ShopGraphError::backend(
                "embedding",
                format!("service returned {}", response.status()),
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ShopGraphError::backend("embedding", e.to_string()))?;

        if parsed.embedding.len() != self.dimension {
            return Err(ShopGraphError::backend(
                "embedding",
                format!(
                    "expected a {}-dimensional vector, got {}",
                    self.dimension,
                    parsed.embedding.len()
                ),
            ));
        }
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EmbeddingClient {
        EmbeddingClient::new(&EmbeddingConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_any_request() {
        let err = client().embed_text("").await.unwrap_err();
        assert!(matches!(err, ShopGraphError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_empty_image_source_is_rejected() {
        let err = client().embed_image("").await.unwrap_err();
        assert!(matches!(err, ShopGraphError::InvalidInput { .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = EmbeddingConfig {
            url: "http://localhost:8091/".into(),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8091");
    }
}
