//! Vector store abstraction.
//!
//! Defines the raw surface of a hosted vector database. Idempotency,
//! readiness polling and dimension checks live one level up in
//! [`crate::IndexOrchestrator`].

use crate::memory::MemoryStore;
use crate::pinecone::PineconeStore;
use crate::types::{IndexDescription, IndexHandle, IndexSpec, IndexStats, QueryMatch, UpsertRecord};
use std::sync::Arc;
use vecquery_core::config::IndexSettings;
use vecquery_core::{ApiKey, AppError, AppResult};

/// Trait for vector store backends.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    /// Backend name (e.g., "pinecone", "memory")
    fn backend_name(&self) -> &str;

    /// All indexes currently listed for the account.
    async fn list_indexes(&self) -> AppResult<Vec<IndexDescription>>;

    /// Describe one index, `None` if it is not listed.
    async fn describe_index(&self, name: &str) -> AppResult<Option<IndexDescription>> {
        Ok(self
            .list_indexes()
            .await?
            .into_iter()
            .find(|desc| desc.name == name))
    }

    /// Request creation of an index. Creation may complete asynchronously.
    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()>;

    /// Delete an index. Fails with `AppError::IndexNotFound` if absent.
    async fn delete_index(&self, name: &str) -> AppResult<()>;

    /// Vector counts and fullness for an index.
    async fn describe_stats(&self, handle: &IndexHandle) -> AppResult<IndexStats>;

    /// Insert or replace records, returning how many were accepted.
    async fn upsert(&self, handle: &IndexHandle, records: &[UpsertRecord]) -> AppResult<usize>;

    /// Top-k neighbours of `vector`, metadata included.
    async fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<QueryMatch>>;
}

/// Create a vector store based on configuration.
pub fn create_store(
    settings: &IndexSettings,
    api_key: Option<&ApiKey>,
) -> AppResult<Arc<dyn VectorStore>> {
    match settings.store.as_str() {
        "pinecone" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("Pinecone store requires PINECONE_API_KEY".to_string())
            })?;
            Ok(Arc::new(PineconeStore::new(
                api_key.clone(),
                settings.controller_url.as_deref(),
            )?))
        }

        "memory" => Ok(Arc::new(MemoryStore::new())),

        _ => Err(AppError::Config(format!(
            "Unknown vector store: '{}'. Supported stores: pinecone, memory",
            settings.store
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_store() {
        let settings = IndexSettings {
            store: "memory".to_string(),
            ..Default::default()
        };
        let store = create_store(&settings, None).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_pinecone_requires_key() {
        let err = create_store(&IndexSettings::default(), None).unwrap_err();
        assert!(err.to_string().contains("PINECONE_API_KEY"));

        let key = ApiKey::new("pc-test");
        let store = create_store(&IndexSettings::default(), Some(&key)).unwrap();
        assert_eq!(store.backend_name(), "pinecone");
    }

    #[test]
    fn test_unknown_store() {
        let settings = IndexSettings {
            store: "faiss".to_string(),
            ..Default::default()
        };
        assert!(create_store(&settings, None).is_err());
    }

    #[tokio::test]
    async fn test_default_describe_uses_listing() {
        let store = MemoryStore::new();
        assert!(store.describe_index("article-index").await.unwrap().is_none());

        store
            .create_index(&IndexSpec::new("article-index", 4, crate::Metric::Cosine))
            .await
            .unwrap();
        let desc = store.describe_index("article-index").await.unwrap().unwrap();
        assert_eq!(desc.dimension, 4);
    }
}
