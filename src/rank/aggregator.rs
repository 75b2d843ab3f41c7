//! Weighted per-entity aggregation of raw nearest-neighbor hits.
//!
//! Each hit contributes `distance * W[kind]` to its entity's weighted
//! distance and `W[kind]` to the weight the entity has seen. An entity that
//! matched through only some of its modalities is renormalized by the weight
//! it actually saw, so it is not favored over entities that matched through
//! all of them.
//!
//! The `most_hits` ranking ignores weights: it counts how many of the raw
//! hits landed on each entity and sums their distances.

use crate::error::IndexResult;
use crate::index::{EntryTable, SearchHit};
use crate::vector::{EntityId, VectorError, VectorKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Weight budgets closer to 1.0 than this are treated as exactly 1.0.
const FULL_WEIGHT_TOLERANCE: f64 = 1e-9;

/// Fixed per-kind weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTable {
    weights: [f64; 4],
}

impl WeightTable {
    /// Validates that every weight is finite and within `[0, 1]`.
    pub fn new(video: f64, description: f64, subtitle: f64, audio: f64) -> Result<Self, VectorError> {
        let weights = [video, description, subtitle, audio];
        for (kind, &value) in VectorKind::ALL.iter().zip(weights.iter()) {
            if !value.is_finite() {
                return Err(VectorError::InvalidWeight {
                    kind: *kind,
                    value,
                    reason: "weight must be a finite number",
                });
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(VectorError::InvalidWeight {
                    kind: *kind,
                    value,
                    reason: "weight must be between 0.0 and 1.0",
                });
            }
        }
        Ok(Self { weights })
    }

    #[must_use]
    pub fn weight(&self, kind: VectorKind) -> f64 {
        self.weights[kind.to_tag() as usize]
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            weights: [0.6, 0.1, 0.1, 0.2],
        }
    }
}

/// How repeated hits of one kind for one entity are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Every hit adds its weighted distance and its weight.
    #[default]
    SumAll,
    /// Only the first (nearest) hit per `(entity, kind)` counts.
    NearestOnly,
}

/// How aggregated entities are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Ascending weighted, renormalized distance.
    #[default]
    Weighted,
    /// Most hits first, then the smallest summed raw distance.
    MostHits,
}

/// Running totals for one entity during one aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateScore {
    pub entity_id: EntityId,
    pub weighted_distance: f64,
    pub total_weight_seen: f64,
}

impl AggregateScore {
    /// Final score, or `None` when the entity saw no weight at all.
    #[must_use]
    pub fn finalize(&self) -> Option<f64> {
        if self.total_weight_seen <= 0.0 {
            return None;
        }
        if (self.total_weight_seen - 1.0).abs() <= FULL_WEIGHT_TOLERANCE {
            Some(self.weighted_distance)
        } else {
            Some(self.weighted_distance / self.total_weight_seen)
        }
    }
}

/// Final aggregated score of one entity; lower is better.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityScore {
    pub entity_id: EntityId,
    pub score: f64,
    /// Hits that contributed to `score`
    pub hits: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedAggregator<'a> {
    weights: &'a WeightTable,
    policy: RepeatPolicy,
}

impl<'a> WeightedAggregator<'a> {
    #[must_use]
    pub fn new(weights: &'a WeightTable, policy: RepeatPolicy) -> Self {
        Self { weights, policy }
    }

    /// Aggregates hits (nearest first) into per-entity scores.
    ///
    /// Entities come out in the order of their first hit. Fails with
    /// `InvalidPosition` if a hit is missing from `entries`.
    pub fn aggregate(
        &self,
        hits: &[SearchHit],
        entries: &EntryTable,
    ) -> IndexResult<Vec<EntityScore>> {
        let mut totals: Vec<(AggregateScore, u32)> = Vec::new();
        let mut slots: HashMap<&EntityId, usize> = HashMap::new();
        let mut seen: HashSet<(&EntityId, VectorKind)> = HashSet::new();

        for hit in hits {
            let entry = entries.resolve(hit.position)?;

            if self.policy == RepeatPolicy::NearestOnly
                && !seen.insert((&entry.entity_id, entry.kind))
            {
                continue;
            }

            let weight = self.weights.weight(entry.kind);
            let slot = *slots.entry(&entry.entity_id).or_insert_with(|| {
                totals.push((
                    AggregateScore {
                        entity_id: entry.entity_id.clone(),
                        weighted_distance: 0.0,
                        total_weight_seen: 0.0,
                    },
                    0,
                ));
                totals.len() - 1
            });

            let (total, hits) = &mut totals[slot];
            total.weighted_distance += f64::from(hit.distance) * weight;
            total.total_weight_seen += weight;
            *hits += 1;
        }

        Ok(totals
            .into_iter()
            .filter_map(|(total, hits)| {
                total.finalize().map(|score| EntityScore {
                    entity_id: total.entity_id,
                    score,
                    hits,
                })
            })
            .collect())
    }
}

/// Counts the hits of every entity and sums their raw distances.
///
/// Every hit counts regardless of kind or weight. Entities come out in the
/// order of their first hit.
pub fn count_hits(hits: &[SearchHit], entries: &EntryTable) -> IndexResult<Vec<EntityScore>> {
    let mut scores: Vec<EntityScore> = Vec::new();
    let mut slots: HashMap<&EntityId, usize> = HashMap::new();

    for hit in hits {
        let entry = entries.resolve(hit.position)?;
        let slot = *slots.entry(&entry.entity_id).or_insert_with(|| {
            scores.push(EntityScore {
                entity_id: entry.entity_id.clone(),
                score: 0.0,
                hits: 0,
            });
            scores.len() - 1
        });

        let score = &mut scores[slot];
        score.score += f64::from(hit.distance);
        score.hits += 1;
    }
    Ok(scores)
}
