//! Projection of ranked hits into caller-facing result records.

use scholar_core::types::ResultRecord;

use crate::ranker::RankedHit;
use crate::store::VectorStore;

/// Round a similarity score to 4 decimal places for presentation.
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Build result records for `hits`, in the given order.
///
/// Hits that point outside the store are skipped; the ranker never produces
/// them for the store it was given.
pub fn assemble(hits: &[RankedHit], store: &VectorStore) -> Vec<ResultRecord> {
    hits.iter()
        .filter_map(|hit| {
            let meta = store.metadata_at(hit.index)?;
            Some(ResultRecord {
                id: meta.id.clone(),
                name: meta.name.clone(),
                category: meta.category,
                similarity_score: round_score(hit.score),
                email: meta.email.clone(),
                profile_link: meta.profile_link.clone(),
                matched_text: meta.text.clone(),
            })
        })
        .collect()
}
