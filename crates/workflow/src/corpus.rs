//! The fixed article corpus.

use serde::Serialize;

/// Sentences indexed by every session, in ordinal order.
pub const ARTICLES: [&str; 3] = [
    "AI is revolutionizing industries by enabling automation and improving efficiency.",
    "Quantum computing promises to solve complex problems that classical computers cannot.",
    "The future of blockchain technology includes decentralized finance and enhanced security.",
];

/// Query used when none is given.
pub const DEFAULT_QUERY: &str = "What is the future of AI?";

/// Number of results when none is requested.
pub const DEFAULT_TOP_K: usize = 3;

/// One corpus entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: String,
    pub text: &'static str,
}

/// Identifier of the article at `ordinal`.
pub fn article_id(ordinal: usize) -> String {
    format!("article-{}", ordinal)
}

/// All articles with their identifiers.
pub fn articles() -> Vec<Article> {
    ARTICLES
        .into_iter()
        .enumerate()
        .map(|(i, text)| Article {
            id: article_id(i),
            text,
        })
        .collect()
}
