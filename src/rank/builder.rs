//! Final ordering and presentation of aggregated scores.

use super::{EntityScore, RankingPolicy};
use crate::store::MetadataStore;
use crate::vector::EntityId;
use serde::Serialize;

/// One row of the search answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub entity_id: EntityId,
    /// Empty when the metadata store has no URL for the entity
    pub url: String,
    pub score: f64,
    /// Raw hits that landed on this entity
    pub hits: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RankedResultBuilder;

impl RankedResultBuilder {
    /// Sorts by the ranking policy, keeps the first `top_n` and attaches
    /// URLs.
    ///
    /// `Weighted` orders by ascending score. `MostHits` orders by descending
    /// hit count, then ascending score. Remaining ties go to the smaller
    /// entity id.
    #[must_use]
    pub fn build(
        mut scores: Vec<EntityScore>,
        ranking: RankingPolicy,
        top_n: usize,
        metadata: &dyn MetadataStore,
    ) -> Vec<RankedResult> {
        scores.sort_by(|a, b| {
            let primary = match ranking {
                RankingPolicy::Weighted => a.score.total_cmp(&b.score),
                RankingPolicy::MostHits => b
                    .hits
                    .cmp(&a.hits)
                    .then_with(|| a.score.total_cmp(&b.score)),
            };
            primary.then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        scores.truncate(top_n);

        scores
            .into_iter()
            .map(|entry| RankedResult {
                url: metadata.url(&entry.entity_id).unwrap_or_default(),
                entity_id: entry.entity_id,
                score: entry.score,
                hits: entry.hits,
            })
            .collect()
    }
}
