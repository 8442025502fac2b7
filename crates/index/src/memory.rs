//! In-process vector store.
//!
//! Exact top-k search over every stored vector. Can simulate a hosted
//! service's eventual consistency: a created index stays unlisted for a
//! number of listing calls, and upserted records stay invisible for a number
//! of stats calls.

use crate::store::VectorStore;
use crate::types::{
    IndexDescription, IndexHandle, IndexSpec, IndexStats, Metric, QueryMatch, UpsertRecord,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use vecquery_core::{AppError, AppResult};

#[derive(Debug)]
struct MemIndex {
    spec: IndexSpec,
    /// Listing calls left before the index shows up
    unlisted_for: u32,
    records: BTreeMap<String, UpsertRecord>,
    pending: Vec<UpsertRecord>,
    /// Stats calls left before `pending` becomes visible
    invisible_for: u32,
}

impl MemIndex {
    fn description(&self) -> IndexDescription {
        IndexDescription {
            name: self.spec.name.clone(),
            dimension: self.spec.dimension,
            metric: self.spec.metric,
            host: None,
            ready: true,
        }
    }

    fn publish_pending(&mut self) {
        for record in self.pending.drain(..) {
            self.records.insert(record.id.clone(), record);
        }
    }
}

/// In-memory [`VectorStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    indexes: Mutex<HashMap<String, MemIndex>>,
    listing_lag: u32,
    write_lag: u32,
}

impl MemoryStore {
    /// A store where every change is visible immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that hides new indexes for `listing_lag` listing calls and
    /// new writes for `write_lag` stats calls.
    pub fn with_lag(listing_lag: u32, write_lag: u32) -> Self {
        Self {
            indexes: Mutex::new(HashMap::new()),
            listing_lag,
            write_lag,
        }
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, HashMap<String, MemIndex>>> {
        self.indexes
            .lock()
            .map_err(|_| AppError::Index("Memory store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn list_indexes(&self) -> AppResult<Vec<IndexDescription>> {
        let mut indexes = self.lock()?;
        let mut listed = Vec::new();

        for index in indexes.values_mut() {
            if index.unlisted_for > 0 {
                index.unlisted_for -= 1;
                continue;
            }
            listed.push(index.description());
        }

        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()> {
        if spec.dimension == 0 {
            return Err(AppError::Index("Index dimension must be positive".to_string()));
        }

        let mut indexes = self.lock()?;
        if indexes.contains_key(&spec.name) {
            tracing::debug!("In-memory index '{}' already exists", spec.name);
            return Ok(());
        }

        indexes.insert(
            spec.name.clone(),
            MemIndex {
                spec: spec.clone(),
                unlisted_for: self.listing_lag,
                records: BTreeMap::new(),
                pending: Vec::new(),
                invisible_for: 0,
            },
        );

        tracing::debug!("Created in-memory index '{}'", spec.name);
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> AppResult<()> {
        self.lock()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::IndexNotFound(name.to_string()))
    }

    async fn describe_stats(&self, handle: &IndexHandle) -> AppResult<IndexStats> {
        let mut indexes = self.lock()?;
        let index = indexes
            .get_mut(&handle.name)
            .ok_or_else(|| AppError::IndexNotFound(handle.name.clone()))?;

        if !index.pending.is_empty() {
            if index.invisible_for == 0 {
                index.publish_pending();
            } else {
                index.invisible_for -= 1;
            }
        }

        let total = index.records.len() as u64;
        let mut namespaces = BTreeMap::new();
        if total > 0 {
            namespaces.insert(String::new(), total);
        }

        Ok(IndexStats {
            total_vector_count: total,
            dimension: index.spec.dimension,
            index_fullness: 0.0,
            namespaces,
        })
    }

    async fn upsert(&self, handle: &IndexHandle, records: &[UpsertRecord]) -> AppResult<usize> {
        let mut indexes = self.lock()?;
        let index = indexes
            .get_mut(&handle.name)
            .ok_or_else(|| AppError::IndexNotFound(handle.name.clone()))?;

        if let Some(bad) = records
            .iter()
            .find(|r| r.values.len() != index.spec.dimension)
        {
            return Err(AppError::Index(format!(
                "Vector dimension {} does not match the dimension of the index {}",
                bad.values.len(),
                index.spec.dimension
            )));
        }

        index.pending.extend(records.iter().cloned());
        index.invisible_for = self.write_lag;
        if self.write_lag == 0 {
            index.publish_pending();
        }

        Ok(records.len())
    }

    async fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<QueryMatch>> {
        let indexes = self.lock()?;
        let index = indexes
            .get(&handle.name)
            .ok_or_else(|| AppError::IndexNotFound(handle.name.clone()))?;

        if vector.len() != index.spec.dimension {
            return Err(AppError::Index(format!(
                "Query vector dimension {} does not match the dimension of the index {}",
                vector.len(),
                index.spec.dimension
            )));
        }

        let metric = index.spec.metric;
        let mut matches: Vec<QueryMatch> = index
            .records
            .values()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: score(metric, vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        sort_matches(metric, &mut matches);
        matches.truncate(top_k);

        Ok(matches)
    }
}

/// Order matches best-first for `metric`.
pub(crate) fn sort_matches(metric: Metric, matches: &mut [QueryMatch]) {
    matches.sort_by(|a, b| {
        let ord = b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal);
        if metric.lower_is_better() {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::Dotproduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Metric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
