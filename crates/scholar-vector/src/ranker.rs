//! Exhaustive cosine-similarity ranking over the whole store.
//!
//! Every row is scored; the category filter is applied to the scored rows,
//! then a stable descending sort keeps store order among equal scores.

use std::cmp::Ordering;

use scholar_core::error::{Result, ScholarError};
use scholar_core::types::Category;

use crate::store::VectorStore;

/// A scored store row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedHit {
    /// Row index in the store.
    pub index: usize,
    /// Full-precision cosine similarity.
    pub score: f64,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    cosine_with_norms(a, norm(a), b, norm(b))
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}

fn cosine_with_norms(a: &[f32], mag_a: f64, b: &[f32], mag_b: f64) -> f64 {
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let score = dot / (mag_a * mag_b);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Rank store rows against `query`, best first, at most `top_k` of them.
///
/// Rows whose category is not exactly `filter` are dropped after scoring and
/// never take a slot. Equal scores keep their store order.
pub fn rank(
    query: &[f32],
    store: &VectorStore,
    filter: Option<Category>,
    top_k: usize,
) -> Result<Vec<RankedHit>> {
    if store.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }
    if query.len() != store.dimension() {
        return Err(ScholarError::DimensionMismatch {
            expected: store.dimension(),
            actual: query.len(),
        });
    }

    let query_norm = norm(query);

    let mut hits: Vec<RankedHit> = store
        .rows()
        .map(|row| {
            let hit = RankedHit {
                index: row.index,
                score: cosine_with_norms(query, query_norm, row.vector, row.norm),
            };
            (row.metadata.category, hit)
        })
        .filter(|(category, _)| filter.map_or(true, |wanted| *category == wanted))
        .map(|(_, hit)| hit)
        .collect();

    // sort_by is stable: ties stay in ascending index order.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholar_core::types::{RecordId, RecordMetadata};

    use crate::store::EmbeddingRecord;

    fn store(rows: Vec<(Category, Vec<f32>)>) -> VectorStore {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, (category, vector))| EmbeddingRecord {
                metadata: RecordMetadata {
                    id: RecordId::from(i as i64),
                    name: format!("Person {}", i),
                    category,
                    email: None,
                    profile_link: None,
                    text: String::new(),
                },
                vector,
            })
            .collect();
        VectorStore::from_records(records).unwrap()
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 0.0, 1.0]);
        let b = cosine_similarity(&[10.0, 20.0, 30.0], &[0.2, 0.0, 0.1]);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0; 8], &[1.0; 8]), 0.0);
        assert_eq!(cosine_similarity(&[1.0; 8], &[0.0; 8]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0; 10], &[1.0; 20]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_descending_score() {
        let s = store(vec![
            (Category::Faculty, vec![-1.0, 0.0]),
            (Category::Faculty, vec![1.0, 0.0]),
            (Category::Faculty, vec![1.0, 1.0]),
        ]);
        let hits = rank(&[1.0, 0.0], &s, None, 10).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(hits[0].score > hits[1].score && hits[1].score > hits[2].score);
    }

    #[test]
    fn test_rank_ties_keep_store_order() {
        let s = store(vec![
            (Category::Faculty, vec![0.0, 1.0]),
            (Category::Adjunct, vec![2.0, 0.0]),
            (Category::Faculty, vec![0.5, 0.0]),
            (Category::Practice, vec![1.0, 0.0]),
        ]);
        let hits = rank(&[1.0, 0.0], &s, None, 10).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits[1].score, hits[2].score);
    }

    #[test]
    fn test_rank_zero_vector_scores_zero_and_sinks() {
        let s = store(vec![
            (Category::Faculty, vec![0.0, 0.0]),
            (Category::Faculty, vec![0.1, 1.0]),
        ]);
        let hits = rank(&[1.0, 0.0], &s, None, 10).unwrap();
        assert_eq!(hits[0].index, 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[1].index, 0);
        assert_eq!(hits[1].score, 0.0);
    }

    #[test]
    fn test_rank_zero_query_scores_everything_zero() {
        let s = store(vec![
            (Category::Faculty, vec![1.0, 0.0]),
            (Category::Faculty, vec![0.0, 1.0]),
        ]);
        let hits = rank(&[0.0, 0.0], &s, None, 10).unwrap();
        assert!(hits.iter().all(|h| h.score == 0.0));
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn test_rank_filter_skips_other_categories() {
        let s = store(vec![
            (Category::Faculty, vec![1.0, 0.0]),
            (Category::Adjunct, vec![0.5, 0.5]),
            (Category::Adjunct, vec![0.0, 1.0]),
            (Category::Unclassified, vec![1.0, 0.0]),
        ]);
        let hits = rank(&[1.0, 0.0], &s, Some(Category::Adjunct), 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);

        let all_adjunct = rank(&[1.0, 0.0], &s, Some(Category::Adjunct), 10).unwrap();
        assert!(all_adjunct
            .iter()
            .all(|h| s.metadata_at(h.index).unwrap().category == Category::Adjunct));
        assert_eq!(all_adjunct.len(), 2);
    }

    #[test]
    fn test_rank_filter_with_no_matches_is_empty() {
        let s = store(vec![(Category::Faculty, vec![1.0, 0.0])]);
        let hits = rank(&[1.0, 0.0], &s, Some(Category::Distinguished), 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_rank_top_k_bound() {
        let s = store(vec![
            (Category::Faculty, vec![1.0, 0.0]),
            (Category::Faculty, vec![0.0, 1.0]),
            (Category::Faculty, vec![1.0, 1.0]),
        ]);
        assert_eq!(rank(&[1.0, 0.0], &s, None, 5).unwrap().len(), 3);
        assert_eq!(rank(&[1.0, 0.0], &s, None, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_rank_empty_store() {
        let s = VectorStore::from_records(Vec::new()).unwrap();
        assert!(rank(&[1.0, 0.0], &s, None, 5).unwrap().is_empty());
    }

    #[test]
    fn test_rank_dimension_mismatch() {
        let s = store(vec![(Category::Faculty, vec![1.0, 0.0])]);
        assert!(matches!(
            rank(&[1.0, 0.0, 0.0], &s, None, 5),
            Err(ScholarError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }
}
