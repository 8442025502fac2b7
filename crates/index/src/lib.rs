//! Vector index adapter for vecquery.
//!
//! Manages a named similarity index: create-or-fetch, write vectors with
//! metadata, top-k query, stats and delete.
//!
//! # Stores
//! - **pinecone**: hosted serverless indexes over the Pinecone REST API
//! - **memory**: exact in-process search, optionally with simulated lag
//!
//! Callers go through [`IndexOrchestrator`], which adds idempotent creation,
//! readiness and visibility polling, and dimension checks on top of a raw
//! [`VectorStore`].

pub mod memory;
pub mod orchestrator;
pub mod pinecone;
pub mod poll;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use orchestrator::IndexOrchestrator;
pub use pinecone::PineconeStore;
pub use poll::{poll_until, PollPolicy};
pub use store::{create_store, VectorStore};
pub use types::{
    IndexDescription, IndexHandle, IndexSpec, IndexStats, Metric, QueryMatch, UpsertRecord,
};
