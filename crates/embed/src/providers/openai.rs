//! OpenAI Embedding Provider
//!
//! Calls the OpenAI embeddings API (`POST /v1/embeddings`), one request per
//! input text.
//!
//! # Features
//! - Bounded concurrency with input order preserved
//! - Automatic retry with exponential backoff on transient failures
//!   (network errors, HTTP 429, HTTP 5xx)
//! - Dimension check on every returned vector
//!
//! # Example
//! ```no_run
//! use vecquery_core::{config::EmbeddingSettings, ApiKey};
//! use vecquery_embed::{EmbeddingProvider, OpenAiProvider};
//!
//! # async fn example() -> vecquery_core::AppResult<()> {
//! let settings = EmbeddingSettings::default();
//! let provider = OpenAiProvider::new(&settings, ApiKey::new("sk-..."))?;
//! let embedding = provider.embed("Hello world").await?;
//! assert_eq!(embedding.len(), 1536);
//! # Ok(())
//! # }
//! ```

use crate::provider::{check_batch, EmbeddingProvider};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use vecquery_core::config::EmbeddingSettings;
use vecquery_core::retry::backoff_delay;
use vecquery_core::{retry, ApiKey, AppError, AppResult};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_ENDPOINT: &str = "/embeddings";

/// OpenAI embedding provider
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    model: String,
    dimensions: usize,
    concurrency: usize,
    max_retries: u32,
}

/// Request payload for the embeddings API
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Response from the embeddings API
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Error envelope returned by the API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// A failed attempt, tagged with whether another attempt may succeed.
#[derive(Debug)]
struct AttemptError {
    error: AppError,
    retryable: bool,
}

impl AttemptError {
    fn fatal(error: AppError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

impl OpenAiProvider {
    /// Create a provider from embedding settings.
    ///
    /// # Errors
    /// * `AppError::Config` - If the HTTP client cannot be built
    pub fn new(settings: &EmbeddingSettings, api_key: ApiKey) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key,
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            concurrency: settings.concurrency.max(1),
            max_retries: settings.max_retries.max(1),
        })
    }

    /// Embed single text with retry logic
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_with_retries(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Embedding failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.max_retries, failure.error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    /// Embed single text (no retries)
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, AttemptError> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError {
                error: AppError::Embedding(format!("Failed to send request to OpenAI: {}", e)),
                retryable: e.is_timeout() || e.is_connect() || e.is_request(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AttemptError {
            error: AppError::Embedding(format!("Failed to read OpenAI response: {}", e)),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(AttemptError {
                error: AppError::Embedding(format!(
                    "OpenAI API error ({}): {}",
                    status,
                    error_message(&body)
                )),
                retryable: is_retryable_status(status),
            });
        }

        parse_embedding_response(&body, self.dimensions).map_err(AttemptError::fatal)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    retry::is_retryable_status(status.as_u16())
}

/// Pull the human-readable message out of an API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn parse_embedding_response(body: &str, dimensions: usize) -> AppResult<Vec<f32>> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Embedding(format!("Failed to parse OpenAI response: {}", e)))?;

    parsed.data.sort_by_key(|d| d.index);
    let embedding = parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| AppError::Embedding("OpenAI response contained no embeddings".to_string()))?;

    if embedding.len() != dimensions {
        return Err(AppError::Embedding(format!(
            "Unexpected embedding dimensions: got {}, expected {}",
            embedding.len(),
            dimensions
        )));
    }

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "openai", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AppError::Embedding(format!(
                "Cannot embed empty text (input {})",
                i
            )));
        }

        debug!(
            "Embedding {} texts with up to {} requests in flight",
            texts.len(),
            self.concurrency
        );

        // `buffered` yields in input order regardless of completion order
        let embeddings: Vec<Vec<f32>> = stream::iter(texts.iter().cloned())
            .map(|text| async move { self.embed_with_retries(&text).await })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        check_batch(&embeddings, texts.len(), self.dimensions)?;
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use vecquery_core::testing::{StubRequest, StubServer};

    fn provider_with(endpoint: Option<&str>) -> OpenAiProvider {
        let settings = EmbeddingSettings {
            endpoint: endpoint.map(str::to_string),
            dimensions: 3,
            ..Default::default()
        };
        OpenAiProvider::new(&settings, ApiKey::new("sk-test")).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = provider_with(None);
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.model_name(), "text-embedding-ada-002");
    }

    #[test]
    fn test_custom_endpoint_trailing_slash() {
        let provider = provider_with(Some("http://localhost:8080/v1/"));
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: "hello",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-ada-002", "input": "hello"})
        );
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2,0.3]}],"model":"text-embedding-ada-002"}"#;
        let embedding = parse_embedding_response(body, 3).unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_response_wrong_dimensions() {
        let body = r#"{"data":[{"index":0,"embedding":[0.1,0.2]}]}"#;
        let err = parse_embedding_response(body, 3).unwrap_err();
        assert!(err.to_string().contains("got 2, expected 3"));
    }

    #[test]
    fn test_parse_response_empty_data() {
        let err = parse_embedding_response(r#"{"data":[]}"#, 3).unwrap_err();
        assert!(err.to_string().contains("no embeddings"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
        assert_eq!(error_message("upstream timeout\n"), "upstream timeout");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_request() {
        let provider = provider_with(Some("http://127.0.0.1:9"));
        let texts = vec!["fine".to_string(), "  ".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(err.to_string().contains("empty text (input 1)"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let provider = provider_with(None);
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    /// Answers with `[input length, 1, 0]` so each vector identifies its text.
    fn length_embedding(request: &StubRequest) -> (u16, String) {
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap_or_default();
        let len = body["input"].as_str().map(str::len).unwrap_or(0);
        let response = serde_json::json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [len as f32, 1.0, 0.0]}],
            "model": body["model"],
        });
        (200, response.to_string())
    }

    fn stub_provider(server: &StubServer, concurrency: usize) -> OpenAiProvider {
        let settings = EmbeddingSettings {
            endpoint: Some(server.url().to_string()),
            dimensions: 3,
            concurrency,
            max_retries: 3,
            ..Default::default()
        };
        OpenAiProvider::new(&settings, ApiKey::new("sk-test")).unwrap()
    }

    #[tokio::test]
    async fn test_embed_batch_over_http_keeps_input_order() {
        let server = StubServer::start(length_embedding).await.unwrap();
        let provider = stub_provider(&server, 4);

        let texts: Vec<String> = ["a", "bbbbbbbb", "ccc", "dddddd", "ee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        let lengths: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(lengths, vec![1.0, 8.0, 3.0, 6.0, 2.0]);

        let requests = server.requests();
        assert_eq!(requests.len(), texts.len());
        assert!(requests
            .iter()
            .all(|r| r.method == "POST" && r.path == "/embeddings"));
    }

    #[tokio::test]
    async fn test_embed_retries_after_server_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let server = StubServer::start(move |request| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (503, r#"{"error":{"message":"overloaded"}}"#.to_string())
            } else {
                length_embedding(request)
            }
        })
        .await
        .unwrap();
        let provider = stub_provider(&server, 1);

        let embedding = provider.embed("four").await.unwrap();
        assert_eq!(embedding, vec![4.0, 1.0, 0.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_embed_does_not_retry_auth_failure() {
        let server = StubServer::start(|_| {
            (401, r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string())
        })
        .await
        .unwrap();
        let provider = stub_provider(&server, 1);

        let err = provider.embed("text").await.unwrap_err();
        assert!(err.to_string().contains("Incorrect API key provided"));
        assert_eq!(server.requests().len(), 1);
    }
}
