//! Embedding client adapter for vecquery.
//!
//! Turns text into fixed-length vectors through a provider-agnostic trait.
//!
//! # Providers
//! - **openai**: OpenAI embeddings API (`text-embedding-ada-002` by default)
//! - **mock**: deterministic offline hashing, for `--offline` runs and tests
//!
//! # Example
//! ```no_run
//! use vecquery_core::config::EmbeddingSettings;
//! use vecquery_embed::create_provider;
//!
//! # async fn example() -> vecquery_core::AppResult<()> {
//! let settings = EmbeddingSettings { provider: "mock".to_string(), ..Default::default() };
//! let provider = create_provider(&settings, None)?;
//! let vectors = provider.embed_batch(&["hello".to_string()]).await?;
//! assert_eq!(vectors[0].len(), provider.dimensions());
//! # Ok(())
//! # }
//! ```

pub mod provider;
pub mod providers;

pub use provider::{check_batch, create_provider, EmbeddingProvider};
pub use providers::{MockProvider, OpenAiProvider};
