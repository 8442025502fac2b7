//! Workflow driver for vecquery.
//!
//! Embeds the fixed article corpus into a similarity index once, then
//! answers nearest-neighbour queries against it. [`Session`] holds the state;
//! [`render`] turns its results into text or JSON for the shells.

pub mod corpus;
pub mod render;
pub mod session;

pub use corpus::{articles, Article, ARTICLES, DEFAULT_QUERY, DEFAULT_TOP_K};
pub use session::{InitReport, SearchHit, Session, TeardownOutcome, WorkflowState};
