//! Workflow session.
//!
//! A [`Session`] owns everything one run of the workflow needs and walks the
//! state machine
//!
//! ```text
//! Uninitialized -> Indexing -> Ready -> (Querying -> Ready)* -> Deleted
//!                                                               |
//!                  Indexing <-----------------------------------+
//! ```
//!
//! Sessions are independent values. Two sessions populating the same remote
//! index at the same time may both see it empty and both write the corpus;
//! the writes are idempotent by id, so the result is the same three records.

use crate::corpus::{self, Article, ARTICLES};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use vecquery_core::config::PollingSettings;
use vecquery_core::{AppConfig, AppError, AppResult};
use vecquery_embed::{create_provider, EmbeddingProvider};
use vecquery_index::{
    create_store, IndexHandle, IndexOrchestrator, IndexSpec, IndexStats, UpsertRecord,
    VectorStore,
};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Uninitialized,
    Indexing,
    Ready,
    Querying,
    Deleted,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Querying => "querying",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Outcome of [`Session::initialize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub handle: IndexHandle,
    /// Records written by this call (0 when the index already had data)
    pub inserted: usize,
    /// The index held vectors before this call
    pub already_populated: bool,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// 1-based position
    pub rank: usize,
    pub id: String,
    pub score: f32,
    pub text: String,
}

/// Outcome of [`Session::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TeardownOutcome {
    Deleted,
    /// Nothing to delete; the index was already gone
    AlreadyAbsent,
}

/// One run of the embed, index and query workflow.
#[derive(Debug)]
pub struct Session {
    embedder: Arc<dyn EmbeddingProvider>,
    index: IndexOrchestrator,
    spec: IndexSpec,
    max_top_k: usize,
    state: WorkflowState,
    handle: Option<IndexHandle>,
}

impl Session {
    /// Assemble a session from its parts.
    ///
    /// Fails if the embedder's dimensionality differs from the index's.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        spec: IndexSpec,
        polling: PollingSettings,
        max_top_k: usize,
    ) -> AppResult<Self> {
        if embedder.dimensions() != spec.dimension {
            return Err(AppError::Config(format!(
                "Embedding model '{}' produces {} dimensions but index '{}' has {}",
                embedder.model_name(),
                embedder.dimensions(),
                spec.name,
                spec.dimension
            )));
        }

        if max_top_k == 0 {
            return Err(AppError::Config("maxTopK must be at least 1".to_string()));
        }

        Ok(Self {
            embedder,
            index: IndexOrchestrator::new(store, polling),
            spec,
            max_top_k,
            state: WorkflowState::Uninitialized,
            handle: None,
        })
    }

    /// Build a session from loaded configuration.
    ///
    /// Validates first, so a missing key fails here before any remote call.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let embedder = create_provider(&config.embedding, config.embedding_api_key())?;
        let store = create_store(&config.index, config.store_api_key())?;
        let spec = IndexSpec::from_settings(&config.index)?;

        debug!(
            "Session using embedder {}/{} and store {}",
            embedder.provider_name(),
            embedder.model_name(),
            store.backend_name()
        );

        Self::new(
            embedder,
            store,
            spec,
            config.polling.clone(),
            config.index.max_top_k,
        )
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn handle(&self) -> Option<&IndexHandle> {
        self.handle.as_ref()
    }

    pub fn index_spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    /// Short description of the embedder and store in use.
    pub fn backends(&self) -> String {
        format!(
            "{} ({}) + {}",
            self.embedder.provider_name(),
            self.embedder.model_name(),
            self.index.backend_name()
        )
    }

    /// The fixed articles this session indexes.
    pub fn corpus(&self) -> Vec<Article> {
        corpus::articles()
    }

    /// Create or reuse the index and make sure it holds the corpus.
    ///
    /// Embeds and writes the corpus only when the index is empty, then waits
    /// until the writes are visible. On failure the session returns to the
    /// state it was in. While `Ready` this is a no-op returning the cached
    /// handle.
    #[instrument(skip(self), fields(index = %self.spec.name))]
    pub async fn initialize(&mut self) -> AppResult<InitReport> {
        match (self.state, &self.handle) {
            (WorkflowState::Ready, Some(handle)) => {
                debug!("Session already initialized");
                return Ok(InitReport {
                    handle: handle.clone(),
                    inserted: 0,
                    already_populated: true,
                });
            }
            (WorkflowState::Uninitialized | WorkflowState::Deleted, _) => {}
            (state, _) => {
                return Err(AppError::Workflow(format!(
                    "Cannot initialize while {}",
                    state
                )));
            }
        }

        let previous = self.state;
        self.state = WorkflowState::Indexing;

        match self.populate().await {
            Ok(report) => {
                self.handle = Some(report.handle.clone());
                self.state = WorkflowState::Ready;
                Ok(report)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    async fn populate(&self) -> AppResult<InitReport> {
        let handle = self.index.ensure_index(&self.spec).await?;

        if !self.index.is_empty(&handle).await? {
            info!(
                "Index '{}' already contains vectors, skipping ingestion",
                handle.name
            );
            return Ok(InitReport {
                handle,
                inserted: 0,
                already_populated: true,
            });
        }

        info!("Generating embeddings...");
        let texts: Vec<String> = ARTICLES.iter().map(|s| s.to_string()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let records: Vec<UpsertRecord> = corpus::articles()
            .into_iter()
            .zip(embeddings)
            .map(|(article, values)| UpsertRecord::with_text(article.id, values, article.text))
            .collect();

        info!("Inserting embeddings into {}...", self.index.backend_name());
        let inserted = self.index.upsert(&handle, &records).await?;
        self.index
            .wait_until_visible(&handle, records.len() as u64)
            .await?;

        Ok(InitReport {
            handle,
            inserted,
            already_populated: false,
        })
    }

    /// Rank the corpus against `query`, best first, at most `top_k` hits.
    ///
    /// Requires `Ready`. The session is back in `Ready` afterwards whether or
    /// not the search succeeded.
    #[instrument(skip(self, query), fields(index = %self.spec.name))]
    pub async fn search(&mut self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
        let handle = match (self.state, &self.handle) {
            (WorkflowState::Ready, Some(handle)) => handle.clone(),
            _ => {
                return Err(AppError::Workflow(
                    "Index not initialized. Please initialize first.".to_string(),
                ))
            }
        };

        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Workflow("Query must not be empty".to_string()));
        }

        if top_k == 0 || top_k > self.max_top_k {
            return Err(AppError::Workflow(format!(
                "Number of results must be between 1 and {}, got {}",
                self.max_top_k, top_k
            )));
        }

        info!("Querying: '{}'", query);
        self.state = WorkflowState::Querying;
        let result = self.run_query(&handle, query, top_k).await;
        self.state = WorkflowState::Ready;
        result
    }

    async fn run_query(
        &self,
        handle: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;
        let matches = self.index.query(handle, &vector, top_k).await?;

        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(i, m)| SearchHit {
                rank: i + 1,
                text: m.text().unwrap_or("N/A").to_string(),
                id: m.id,
                score: m.score,
            })
            .collect())
    }

    /// Delete the index and end the session.
    ///
    /// Uses the held handle, or the configured name if the session never
    /// initialized. An index that is already gone is reported, not an error.
    #[instrument(skip(self), fields(index = %self.spec.name))]
    pub async fn teardown(&mut self) -> AppResult<TeardownOutcome> {
        let name = self
            .handle
            .as_ref()
            .map(|h| h.name.clone())
            .unwrap_or_else(|| self.spec.name.clone());

        let outcome = match self.index.delete_index(&name).await {
            Ok(()) => TeardownOutcome::Deleted,
            Err(e) if e.is_not_found() => {
                info!("Index '{}' does not exist, nothing to delete", name);
                TeardownOutcome::AlreadyAbsent
            }
            Err(e) => return Err(e),
        };

        self.handle = None;
        self.state = WorkflowState::Deleted;
        Ok(outcome)
    }

    /// Remote statistics for the session's index.
    ///
    /// Looks the index up by name when the session has not initialized.
    pub async fn stats(&self) -> AppResult<IndexStats> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => self
                .index
                .find_index(&self.spec.name)
                .await?
                .ok_or_else(|| AppError::IndexNotFound(self.spec.name.clone()))?,
        };
        self.index.stats(&handle).await
    }
}
