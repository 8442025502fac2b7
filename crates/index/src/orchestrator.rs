//! Index lifecycle on top of a [`VectorStore`].
//!
//! Adds what the raw store surface lacks: idempotent create-or-fetch with a
//! bounded readiness wait, a configuration check on reuse, dimension checks
//! on every vector in and out, and a bounded wait for write visibility.

use crate::memory::sort_matches;
use crate::poll::{poll_until, PollPolicy};
use crate::store::VectorStore;
use crate::types::{IndexHandle, IndexSpec, IndexStats, QueryMatch, UpsertRecord};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vecquery_core::config::PollingSettings;
use vecquery_core::{AppError, AppResult};

/// Drives index operations against one store.
#[derive(Debug, Clone)]
pub struct IndexOrchestrator {
    store: Arc<dyn VectorStore>,
    polling: PollingSettings,
}

impl IndexOrchestrator {
    pub fn new(store: Arc<dyn VectorStore>, polling: PollingSettings) -> Self {
        Self { store, polling }
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Return a handle to `spec.name`, creating the index if it is not listed.
    ///
    /// Idempotent. An existing index whose dimension or metric differ from
    /// `spec` is rejected rather than reused. After a create request the call
    /// polls until the index is listed and reports ready, bounded by the
    /// readiness timeout. An index that drops out of the listing during the
    /// wait is requested again.
    #[instrument(skip(self, spec), fields(index = %spec.name, backend = %self.store.backend_name()))]
    pub async fn ensure_index(&self, spec: &IndexSpec) -> AppResult<IndexHandle> {
        if let Some(existing) = self.store.describe_index(&spec.name).await? {
            info!("Index '{}' already exists. Using existing index.", spec.name);
            check_compatible(spec, existing.dimension, existing.metric)?;

            if existing.ready {
                return Ok(existing.into());
            }
        } else {
            info!("Creating new index '{}'...", spec.name);
            self.store.create_index(spec).await?;
        }

        info!("Waiting for index '{}' to be ready...", spec.name);
        let store = Arc::clone(&self.store);
        let description = poll_until(
            &format!("index '{}' ready", spec.name),
            PollPolicy::readiness(&self.polling),
            || {
                let store = Arc::clone(&store);
                let spec = spec.clone();
                async move {
                    match store.describe_index(&spec.name).await? {
                        Some(desc) => Ok(desc.ready.then_some(desc)),
                        // Gone while we waited (e.g. a delete still terminating)
                        None => {
                            debug!("Index '{}' not listed; requesting creation", spec.name);
                            store.create_index(&spec).await?;
                            Ok(None)
                        }
                    }
                }
            },
        )
        .await?;

        check_compatible(spec, description.dimension, description.metric)?;
        Ok(description.into())
    }

    /// Handle to an existing, ready index without creating anything.
    pub async fn find_index(&self, name: &str) -> AppResult<Option<IndexHandle>> {
        Ok(self
            .store
            .describe_index(name)
            .await?
            .filter(|desc| desc.ready)
            .map(IndexHandle::from))
    }

    /// Whether the index currently holds zero vectors.
    pub async fn is_empty(&self, handle: &IndexHandle) -> AppResult<bool> {
        Ok(self.stats(handle).await?.total_vector_count == 0)
    }

    pub async fn stats(&self, handle: &IndexHandle) -> AppResult<IndexStats> {
        self.store.describe_stats(handle).await
    }

    /// Write all records, or none.
    ///
    /// Every vector is checked against the handle's dimension before anything
    /// is sent. Remote failures propagate as-is; there is no partial-success
    /// accounting.
    #[instrument(skip(self, handle, records), fields(index = %handle.name, count = records.len()))]
    pub async fn upsert(&self, handle: &IndexHandle, records: &[UpsertRecord]) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        for record in records {
            check_dimension(handle, &record.values, &record.id)?;
        }

        let upserted = self.store.upsert(handle, records).await?;
        if upserted != records.len() {
            warn!(
                "Store reported {} upserted vectors for {} records",
                upserted,
                records.len()
            );
        }

        info!("Successfully inserted {} vectors.", upserted);
        Ok(upserted)
    }

    /// Poll stats until at least `expected` vectors are visible.
    #[instrument(skip(self, handle), fields(index = %handle.name))]
    pub async fn wait_until_visible(
        &self,
        handle: &IndexHandle,
        expected: u64,
    ) -> AppResult<IndexStats> {
        info!("Waiting for vectors to be indexed...");
        let store = Arc::clone(&self.store);

        poll_until(
            &format!("{} vectors visible in '{}'", expected, handle.name),
            PollPolicy::visibility(&self.polling),
            || {
                let store = Arc::clone(&store);
                let handle = handle.clone();
                async move {
                    let stats = store.describe_stats(&handle).await?;
                    debug!(
                        "'{}' reports {} of {} vectors",
                        handle.name, stats.total_vector_count, expected
                    );
                    Ok((stats.total_vector_count >= expected).then_some(stats))
                }
            },
        )
        .await
    }

    /// The `top_k` nearest neighbours of `vector`, best first.
    #[instrument(skip(self, handle, vector), fields(index = %handle.name))]
    pub async fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<QueryMatch>> {
        if top_k == 0 {
            return Err(AppError::Index("top_k must be a positive integer".to_string()));
        }
        check_dimension(handle, vector, "query")?;

        let mut matches = self.store.query(handle, vector, top_k).await?;
        sort_matches(handle.metric, &mut matches);
        matches.truncate(top_k);

        debug!(
            "Retrieved {} matches (requested top-{})",
            matches.len(),
            top_k
        );
        Ok(matches)
    }

    /// Delete an index. Irreversible.
    ///
    /// An already absent index yields `AppError::IndexNotFound`, which callers
    /// are expected to treat as a terminal notice rather than a failure.
    #[instrument(skip(self))]
    pub async fn delete_index(&self, name: &str) -> AppResult<()> {
        info!("Deleting index '{}'...", name);
        self.store.delete_index(name).await?;
        info!("Index '{}' deleted successfully.", name);
        Ok(())
    }
}

fn check_compatible(
    spec: &IndexSpec,
    dimension: usize,
    metric: crate::types::Metric,
) -> AppResult<()> {
    if dimension != spec.dimension {
        return Err(AppError::Index(format!(
            "Dimension mismatch for existing index '{}': expected {}, found {}",
            spec.name, spec.dimension, dimension
        )));
    }

    if metric != spec.metric {
        return Err(AppError::Index(format!(
            "Metric mismatch for existing index '{}': expected {}, found {}",
            spec.name, spec.metric, metric
        )));
    }

    Ok(())
}

fn check_dimension(handle: &IndexHandle, vector: &[f32], what: &str) -> AppResult<()> {
    if vector.len() != handle.dimension {
        return Err(AppError::Index(format!(
            "Vector '{}' has dimension {}, index '{}' expects {}",
            what,
            vector.len(),
            handle.name,
            handle.dimension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::{IndexDescription, Metric};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_polling() -> PollingSettings {
        PollingSettings {
            interval_ms: 1,
            max_interval_ms: 4,
            ready_timeout_secs: 2,
            visibility_timeout_secs: 2,
        }
    }

    fn orchestrator(store: MemoryStore) -> IndexOrchestrator {
        IndexOrchestrator::new(Arc::new(store), fast_polling())
    }

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let orch = orchestrator(MemoryStore::new());
        let spec = IndexSpec::new("article-index", 8, Metric::Cosine);

        let first = orch.ensure_index(&spec).await.unwrap();
        let second = orch.ensure_index(&spec).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.dimension, 8);
    }

    #[tokio::test]
    async fn test_find_index_does_not_create() {
        let orch = orchestrator(MemoryStore::new());
        assert!(orch.find_index("article-index").await.unwrap().is_none());

        let spec = IndexSpec::new("article-index", 8, Metric::Cosine);
        let created = orch.ensure_index(&spec).await.unwrap();
        assert_eq!(orch.find_index("article-index").await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_ensure_index_waits_for_listing() {
        let orch = orchestrator(MemoryStore::with_lag(3, 0));
        let spec = IndexSpec::new("article-index", 8, Metric::Cosine);

        let handle = orch.ensure_index(&spec).await.unwrap();
        assert_eq!(handle.name, "article-index");
    }

    #[tokio::test]
    async fn test_ensure_index_times_out() {
        let mut polling = fast_polling();
        polling.ready_timeout_secs = 0;
        let orch = IndexOrchestrator::new(Arc::new(MemoryStore::with_lag(1000, 0)), polling);

        let err = orch
            .ensure_index(&IndexSpec::new("slow", 8, Metric::Cosine))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    /// Listed once as not ready, then gone until someone creates it again.
    #[derive(Debug, Default)]
    struct VanishingStore {
        describes: AtomicUsize,
        creates: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VectorStore for VanishingStore {
        fn backend_name(&self) -> &str {
            "vanishing"
        }

        async fn list_indexes(&self) -> AppResult<Vec<IndexDescription>> {
            Ok(self.describe_index("article-index").await?.into_iter().collect())
        }

        async fn describe_index(&self, name: &str) -> AppResult<Option<IndexDescription>> {
            let first = self.describes.fetch_add(1, Ordering::SeqCst) == 0;
            let created = self.creates.load(Ordering::SeqCst) > 0;
            Ok((first || created).then(|| IndexDescription {
                name: name.to_string(),
                dimension: 8,
                metric: Metric::Cosine,
                host: created.then(|| "idx.local".to_string()),
                ready: created,
            }))
        }

        async fn create_index(&self, _spec: &IndexSpec) -> AppResult<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_index(&self, name: &str) -> AppResult<()> {
            Err(AppError::IndexNotFound(name.to_string()))
        }

        async fn describe_stats(&self, _handle: &IndexHandle) -> AppResult<IndexStats> {
            Ok(IndexStats::default())
        }

        async fn upsert(&self, _handle: &IndexHandle, records: &[UpsertRecord]) -> AppResult<usize> {
            Ok(records.len())
        }

        async fn query(
            &self,
            _handle: &IndexHandle,
            _vector: &[f32],
            _top_k: usize,
        ) -> AppResult<Vec<QueryMatch>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_ensure_index_recreates_index_that_disappears() {
        let store = Arc::new(VanishingStore::default());
        let orch = IndexOrchestrator::new(store.clone(), fast_polling());

        let handle = orch
            .ensure_index(&IndexSpec::new("article-index", 8, Metric::Cosine))
            .await
            .unwrap();

        assert_eq!(handle.name, "article-index");
        assert_eq!(handle.host.as_deref(), Some("idx.local"));
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reuse_with_mismatched_dimension_rejected() {
        let orch = orchestrator(MemoryStore::new());
        orch.ensure_index(&IndexSpec::new("article-index", 8, Metric::Cosine))
            .await
            .unwrap();

        let err = orch
            .ensure_index(&IndexSpec::new("article-index", 16, Metric::Cosine))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Dimension mismatch"));

        let err = orch
            .ensure_index(&IndexSpec::new("article-index", 8, Metric::Dotproduct))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Metric mismatch"));
    }

    #[tokio::test]
    async fn test_upsert_then_exact_query_scores_one() {
        let orch = orchestrator(MemoryStore::with_lag(0, 2));
        let handle = orch
            .ensure_index(&IndexSpec::new("article-index", 4, Metric::Cosine))
            .await
            .unwrap();
        assert!(orch.is_empty(&handle).await.unwrap());

        let records: Vec<UpsertRecord> = (0..3)
            .map(|i| UpsertRecord::with_text(format!("article-{}", i), unit(4, i), format!("text {}", i)))
            .collect();
        assert_eq!(orch.upsert(&handle, &records).await.unwrap(), 3);

        let stats = orch.wait_until_visible(&handle, 3).await.unwrap();
        assert_eq!(stats.total_vector_count, 3);
        assert!(!orch.is_empty(&handle).await.unwrap());

        let matches = orch.query(&handle, &unit(4, 1), 3).await.unwrap();
        assert_eq!(matches[0].id, "article-1");
        assert!(matches[0].score > 0.999);
        assert!(matches.len() <= 3);
        for m in &matches {
            assert!(records.iter().any(|r| r.id == m.id));
        }
    }

    #[tokio::test]
    async fn test_query_never_exceeds_k() {
        let orch = orchestrator(MemoryStore::new());
        let handle = orch
            .ensure_index(&IndexSpec::new("idx", 4, Metric::Cosine))
            .await
            .unwrap();
        let records: Vec<UpsertRecord> = (0..4)
            .map(|i| UpsertRecord::with_text(format!("r{}", i), unit(4, i), "t"))
            .collect();
        orch.upsert(&handle, &records).await.unwrap();

        assert_eq!(orch.query(&handle, &unit(4, 0), 2).await.unwrap().len(), 2);
        assert_eq!(orch.query(&handle, &unit(4, 0), 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let orch = orchestrator(MemoryStore::new());
        let handle = orch
            .ensure_index(&IndexSpec::new("idx", 4, Metric::Cosine))
            .await
            .unwrap();

        let err = orch.query(&handle, &unit(4, 0), 0).await.unwrap_err();
        assert!(err.to_string().contains("positive"));

        let err = orch.query(&handle, &[1.0, 0.0], 1).await.unwrap_err();
        assert!(err.to_string().contains("expects 4"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_any_bad_vector() {
        let orch = orchestrator(MemoryStore::new());
        let handle = orch
            .ensure_index(&IndexSpec::new("idx", 4, Metric::Cosine))
            .await
            .unwrap();

        let records = vec![
            UpsertRecord::with_text("ok", unit(4, 0), "ok"),
            UpsertRecord::with_text("bad", vec![1.0; 3], "bad"),
        ];
        let err = orch.upsert(&handle, &records).await.unwrap_err();
        assert!(err.to_string().contains("'bad'"));
        assert!(orch.is_empty(&handle).await.unwrap());
    }

    #[tokio::test]
    async fn test_visibility_timeout() {
        let mut polling = fast_polling();
        polling.visibility_timeout_secs = 0;
        let orch = IndexOrchestrator::new(Arc::new(MemoryStore::new()), polling);
        let handle = orch
            .ensure_index(&IndexSpec::new("idx", 4, Metric::Cosine))
            .await
            .unwrap();

        let err = orch.wait_until_visible(&handle, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_delete_then_recreate_is_empty() {
        let orch = orchestrator(MemoryStore::new());
        let spec = IndexSpec::new("article-index", 4, Metric::Cosine);
        let handle = orch.ensure_index(&spec).await.unwrap();
        orch.upsert(&handle, &[UpsertRecord::with_text("a", unit(4, 0), "a")])
            .await
            .unwrap();

        orch.delete_index(&handle.name).await.unwrap();
        let err = orch.delete_index(&handle.name).await.unwrap_err();
        assert!(err.is_not_found());

        let handle = orch.ensure_index(&spec).await.unwrap();
        assert!(orch.is_empty(&handle).await.unwrap());
    }
}
