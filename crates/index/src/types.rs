//! Vector index type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use vecquery_core::config::IndexSettings;
use vecquery_core::{AppError, AppResult};

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dotproduct => "dotproduct",
        }
    }

    /// Euclidean scores are distances: smaller is closer.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Self::Euclidean)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "dotproduct" => Ok(Self::Dotproduct),
            other => Err(AppError::Config(format!("Unknown similarity metric: {}", other))),
        }
    }
}

/// Everything needed to create an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

impl IndexSpec {
    /// A serverless spec on the default cloud and region.
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        let defaults = IndexSettings::default();
        Self {
            name: name.into(),
            dimension,
            metric,
            cloud: defaults.cloud,
            region: defaults.region,
        }
    }

    pub fn from_settings(settings: &IndexSettings) -> AppResult<Self> {
        Ok(Self {
            name: settings.name.clone(),
            dimension: settings.dimension,
            metric: settings.metric.parse()?,
            cloud: settings.cloud.clone(),
            region: settings.region.clone(),
        })
    }
}

/// An index as reported by the store's listing.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    /// Data plane host, once assigned
    pub host: Option<String>,
    /// Whether the index reports itself ready to serve
    pub ready: bool,
}

/// Reference to a remotely hosted named index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHandle {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub host: Option<String>,
}

impl From<IndexDescription> for IndexHandle {
    fn from(desc: IndexDescription) -> Self {
        Self {
            name: desc.name,
            dimension: desc.dimension,
            metric: desc.metric,
            host: desc.host,
        }
    }
}

/// One record to write. Re-upserting an id replaces it entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl UpsertRecord {
    /// A record whose metadata carries the source text under `"text"`.
    pub fn with_text(id: impl Into<String>, values: Vec<f32>, text: impl Into<String>) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("text".to_string(), serde_json::Value::String(text.into()));
        Self {
            id: id.into(),
            values,
            metadata,
        }
    }
}

/// One ranked neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl QueryMatch {
    /// The `"text"` metadata field, if present.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").and_then(|v| v.as_str())
    }
}

/// Index statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: usize,
    pub index_fullness: f32,
    /// Vector count per namespace ("" is the default namespace)
    pub namespaces: BTreeMap<String, u64>,
}
