//! Turning raw index hits into a ranked list of entities.

mod aggregator;
mod builder;

pub use aggregator::{
    AggregateScore, EntityScore, RankingPolicy, RepeatPolicy, WeightTable, WeightedAggregator,
    count_hits,
};
pub use builder::{RankedResult, RankedResultBuilder};
