//! Query encoder: raw query text to a single query vector.
//!
//! Short queries (two tokens or fewer) are usually acronyms or bare keywords
//! whose embeddings are noisy. They are expanded with fixed academic-context
//! templates and the unit-normalized embeddings of all variants are averaged.
//! Longer queries are embedded as-is.

use std::sync::Arc;

use tracing::debug;

use scholar_core::error::{Result, ScholarError};

use crate::embedding::{l2_normalize, DynEmbeddingService};

/// Queries with at most this many whitespace-separated tokens are augmented.
pub const SHORT_QUERY_MAX_TOKENS: usize = 2;

/// Suffixes appended to short queries. Changing these changes rankings.
pub const AUGMENTATION_SUFFIXES: [&str; 4] = [
    "research",
    "in computer science",
    "academic research",
    "field of study",
];

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The texts to embed for an already normalized query.
///
/// Always starts with the query itself.
pub fn augment(normalized: &str) -> Vec<String> {
    let tokens = normalized.split_whitespace().count();
    if tokens == 0 || tokens > SHORT_QUERY_MAX_TOKENS {
        return vec![normalized.to_string()];
    }

    std::iter::once(normalized.to_string())
        .chain(
            AUGMENTATION_SUFFIXES
                .iter()
                .map(|suffix| format!("{} {}", normalized, suffix)),
        )
        .collect()
}

/// Turns query text into a vector matching the store's dimension.
///
/// Holds no per-call state; concurrent calls are safe as long as the
/// wrapped embedding service is.
#[derive(Clone)]
pub struct QueryEncoder {
    embedder: Arc<dyn DynEmbeddingService>,
}

impl std::fmt::Debug for QueryEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEncoder")
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}

impl QueryEncoder {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self { embedder }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Encode `query` into the element-wise mean of the unit-normalized
    /// embeddings of its augmented set.
    ///
    /// The mean is not re-normalized; cosine scoring is scale-invariant.
    pub async fn encode(&self, query: &str) -> Result<Vec<f32>> {
        let normalized = normalize_whitespace(query);
        if normalized.is_empty() {
            return Err(ScholarError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }

        let variants = augment(&normalized);
        debug!(query = %normalized, variants = variants.len(), "Encoding query");

        let dimensions = self.dimensions();
        let mut sum = vec![0.0f64; dimensions];

        for text in &variants {
            let mut vector = self.embedder.embed_boxed(text).await?;
            if vector.len() != dimensions {
                return Err(ScholarError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            l2_normalize(&mut vector);
            for (acc, value) in sum.iter_mut().zip(&vector) {
                *acc += *value as f64;
            }
        }

        let count = variants.len() as f64;
        Ok(sum.into_iter().map(|v| (v / count) as f32).collect())
    }
}
