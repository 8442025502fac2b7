//! Embedding provider trait and factory.

use std::sync::Arc;
use vecquery_core::config::EmbeddingSettings;
use vecquery_core::{ApiKey, AppError, AppResult};

use crate::providers::{MockProvider, OpenAiProvider};

/// Trait for embedding providers.
///
/// `embed_batch` returns exactly one vector per input, in input order, each
/// of `dimensions()` length. A provider that cannot honour that for every
/// input fails the whole call.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "openai", "mock")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider based on configuration.
///
/// Remote providers require `api_key`; its absence is a configuration error
/// raised before any request is sent.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<&ApiKey>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI embedding provider requires OPENAI_API_KEY".to_string())
            })?;
            Ok(Arc::new(OpenAiProvider::new(settings, api_key.clone())?))
        }

        "mock" => Ok(Arc::new(MockProvider::new(settings.dimensions))),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: openai, mock",
            settings.provider
        ))),
    }
}

/// Check a finished batch against the one-vector-per-input contract.
pub fn check_batch(
    embeddings: &[Vec<f32>],
    expected_len: usize,
    dimensions: usize,
) -> AppResult<()> {
    if embeddings.len() != expected_len {
        return Err(AppError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected_len,
            embeddings.len()
        )));
    }

    if let Some((i, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() != dimensions)
    {
        return Err(AppError::Embedding(format!(
            "Embedding {} has {} dimensions, expected {}",
            i,
            bad.len(),
            dimensions
        )));
    }

    Ok(())
}
