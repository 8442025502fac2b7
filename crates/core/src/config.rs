//! Configuration management for vecquery.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults (the demo's fixed index identity)
//! - A `.env` file in the workspace
//! - Config files (`.vecquery/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources win. The two API keys only ever come from the environment
//! (process variables or the `.env` file).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Environment variable holding the embedding service key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the vector database key.
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";

/// Name of the demo index.
pub const DEFAULT_INDEX_NAME: &str = "article-index";

/// Output dimension of `text-embedding-ada-002`.
pub const DEFAULT_DIMENSION: usize = 1536;

/// Similarity metric of the demo index.
pub const DEFAULT_METRIC: &str = "cosine";

/// Embedding model used by the OpenAI provider.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

const KNOWN_PROVIDERS: [&str; 2] = ["openai", "mock"];
const KNOWN_STORES: [&str; 2] = ["pinecone", "memory"];
const KNOWN_METRICS: [&str; 3] = ["cosine", "euclidean", "dotproduct"];

/// An API key that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "openai" or "mock"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Expected vector length
    pub dimensions: usize,

    /// Custom API base URL
    pub endpoint: Option<String>,

    /// Maximum embedding requests in flight
    pub concurrency: usize,

    /// Attempts per text before giving up
    pub max_retries: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSION,
            endpoint: None,
            concurrency: 4,
            max_retries: 3,
            request_timeout_secs: 30,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexSettings {
    /// Store backend: "pinecone" or "memory"
    pub store: String,

    /// Index name (unique per account)
    pub name: String,

    /// Vector dimensionality of the index
    pub dimension: usize,

    /// Similarity metric
    pub metric: String,

    /// Serverless cloud
    pub cloud: String,

    /// Serverless region
    pub region: String,

    /// Control plane base URL override
    pub controller_url: Option<String>,

    /// Upper bound accepted for top-k by the interactive shell
    pub max_top_k: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            store: "pinecone".to_string(),
            name: DEFAULT_INDEX_NAME.to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: DEFAULT_METRIC.to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            controller_url: None,
            max_top_k: 10,
        }
    }
}

/// Bounds for readiness and write-visibility polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub ready_timeout_secs: u64,
    pub visibility_timeout_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_interval_ms: 5000,
            ready_timeout_secs: 120,
            visibility_timeout_secs: 30,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.interval_ms))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Workspace root (holds `.env` and `.vecquery/`)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Embedding service key
    pub openai_api_key: Option<ApiKey>,

    /// Vector database key
    pub pinecone_api_key: Option<ApiKey>,

    pub embedding: EmbeddingSettings,

    pub index: IndexSettings,

    pub polling: PollingSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    embedding: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    polling: Option<PollingSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

/// Values supplied on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub index_name: Option<String>,
    pub embedding_provider: Option<String>,
    pub store: Option<String>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    /// Use the mock provider and the in-memory store; no keys needed
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            openai_api_key: None,
            pinecone_api_key: None,
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            polling: PollingSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration for a workspace.
    ///
    /// `workspace` and `config_file` fall back to `VECQUERY_WORKSPACE`,
    /// `VECQUERY_CONFIG` and finally the current directory and
    /// `<workspace>/.vecquery/config.yaml`.
    ///
    /// Environment variables:
    /// - `OPENAI_API_KEY`, `PINECONE_API_KEY`: service credentials
    /// - `VECQUERY_INDEX`: index name
    /// - `VECQUERY_EMBEDDING_PROVIDER`: "openai" or "mock"
    /// - `VECQUERY_STORE`: "pinecone" or "memory"
    /// - `RUST_LOG`: log level
    /// - `NO_COLOR`: disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use vecquery_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None, None).expect("Failed to load config");
    /// println!("Index: {}", config.index.name);
    /// ```
    pub fn load(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| std::env::var("VECQUERY_WORKSPACE").ok().map(PathBuf::from)) {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("VECQUERY_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        // Fills unset process variables only
        let env_path = config.env_file_path();
        if env_path.exists() {
            dotenvy::from_path(&env_path).map_err(|e| {
                AppError::Config(format!("Failed to read env file {:?}: {}", env_path, e))
            })?;
            tracing::debug!("Loaded environment from {:?}", env_path);
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.vecquery_dir().join("config.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    fn merge_yaml_str(&mut self, contents: &str) -> AppResult<()> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        if let Some(embedding) = config_file.embedding {
            self.embedding = embedding;
        }

        if let Some(index) = config_file.index {
            self.index = index;
        }

        if let Some(polling) = config_file.polling {
            self.polling = polling;
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        Ok(())
    }

    /// Apply environment variables through `lookup`.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(OPENAI_API_KEY_ENV) {
            self.openai_api_key = Some(ApiKey::new(key.trim()));
        }

        if let Some(key) = non_empty(PINECONE_API_KEY_ENV) {
            self.pinecone_api_key = Some(ApiKey::new(key.trim()));
        }

        if let Some(name) = non_empty("VECQUERY_INDEX") {
            self.index.name = name;
        }

        if let Some(provider) = non_empty("VECQUERY_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.to_lowercase();
        }

        if let Some(store) = non_empty("VECQUERY_STORE") {
            self.index.store = store.to_lowercase();
        }

        if let Some(level) = non_empty("RUST_LOG") {
            self.log_level = Some(level);
        }

        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over everything loaded before.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(name) = overrides.index_name {
            self.index.name = name;
        }

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider.to_lowercase();
        }

        if let Some(store) = overrides.store {
            self.index.store = store.to_lowercase();
        }

        if overrides.offline {
            self.embedding.provider = "mock".to_string();
            self.index.store = "memory".to_string();
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .vecquery directory.
    pub fn vecquery_dir(&self) -> PathBuf {
        self.workspace.join(".vecquery")
    }

    /// Path of the workspace `.env` file.
    pub fn env_file_path(&self) -> PathBuf {
        self.workspace.join(".env")
    }

    /// Key for the embedding provider, required only for remote providers.
    pub fn embedding_api_key(&self) -> Option<&ApiKey> {
        self.openai_api_key.as_ref()
    }

    /// Key for the vector store, required only for remote stores.
    pub fn store_api_key(&self) -> Option<&ApiKey> {
        self.pinecone_api_key.as_ref()
    }

    /// Validate configuration before any remote call is made.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.embedding.provider.as_str();
        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        let store = self.index.store.as_str();
        if !KNOWN_STORES.contains(&store) {
            return Err(AppError::Config(format!(
                "Unknown vector store: {}. Supported: {}",
                store,
                KNOWN_STORES.join(", ")
            )));
        }

        if !KNOWN_METRICS.contains(&self.index.metric.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown similarity metric: {}. Supported: {}",
                self.index.metric,
                KNOWN_METRICS.join(", ")
            )));
        }

        if provider == "openai" && self.openai_api_key.is_none() {
            return Err(AppError::Config(format!(
                "{} not found in environment variables",
                OPENAI_API_KEY_ENV
            )));
        }

        if store == "pinecone" && self.pinecone_api_key.is_none() {
            return Err(AppError::Config(format!(
                "{} not found in environment variables",
                PINECONE_API_KEY_ENV
            )));
        }

        if self.index.name.trim().is_empty() {
            return Err(AppError::Config("Index name must not be empty".to_string()));
        }

        if self.embedding.dimensions != self.index.dimension {
            return Err(AppError::Config(format!(
                "Embedding dimensions ({}) do not match index dimension ({})",
                self.embedding.dimensions, self.index.dimension
            )));
        }

        if self.index.max_top_k == 0 {
            return Err(AppError::Config("maxTopK must be at least 1".to_string()));
        }

        if self.polling.interval_ms == 0 {
            return Err(AppError::Config("Polling interval must be positive".to_string()));
        }

        Ok(())
    }
}

/// Render the contents of a `.env` file holding both keys.
pub fn render_env_file(pinecone_key: &str, openai_key: &str) -> String {
    format!(
        "# Pinecone API Key\n{}={}\n\n# OpenAI API Key\n{}={}\n",
        PINECONE_API_KEY_ENV, pinecone_key, OPENAI_API_KEY_ENV, openai_key
    )
}
