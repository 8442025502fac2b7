//! Deterministic offline embedding provider.

use crate::provider::EmbeddingProvider;
use std::collections::HashMap;
use vecquery_core::AppResult;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "can", "cannot",
];

/// Hash-based provider for offline runs and tests.
///
/// Words and their character trigrams are hashed into buckets of a
/// fixed-length vector, which is then normalized. Texts sharing vocabulary
/// land close together; identical texts produce identical vectors. There is
/// no semantic understanding beyond shared tokens.
///
/// Offline rankings are therefore lexical. "What is the future of AI?" ranks
/// the blockchain article first because it shares "future", a longer token
/// than "ai"; a hosted model would rank the AI article first.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    /// Create a new mock provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 2 && !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect()
    }

    fn bucket(&self, token: &str, seed: u64) -> usize {
        let hash = token
            .bytes()
            .fold(seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        (hash as usize) % self.dimensions
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let mut freq: HashMap<String, u32> = HashMap::new();
        for token in Self::tokens(text) {
            *freq.entry(token).or_insert(0) += 1;
        }

        for (word, count) in &freq {
            embedding[self.bucket(word, 7)] += *count as f32;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(&trigram, 13)] += (*count as f32).sqrt() * 0.5;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.generate(text)).collect())
    }
}
