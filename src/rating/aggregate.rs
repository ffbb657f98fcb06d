//! Per-item vote aggregate and the running-mean update

use crate::types::{AggregateKey, ItemId};
use serde::{Deserialize, Serialize};

/// Vote statistics for one (model, attribute, item) triple
///
/// `mean_value` is stored as a fraction of the attribute's `rating_max`, so
/// aggregates of attributes with different scales stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub item_id: ItemId,
    pub vote_count: u64,
    pub mean_value: f64,
}

impl RatingAggregate {
    /// Aggregate of an item nobody has voted on yet
    pub fn zero(item_id: ItemId) -> Self {
        Self {
            item_id,
            vote_count: 0,
            mean_value: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.vote_count == 0
    }

    /// Fold one raw (un-normalized) vote into the running mean.
    ///
    /// The previous sum of votes is reconstructed from the stored mean, the
    /// new vote is added and the result normalized by `rating_max` times the
    /// new vote count. `rating_max` must be positive; attribute configuration
    /// guarantees that before any vote reaches the store.
    pub fn with_vote(&self, raw_value: f64, rating_max: f64) -> Self {
        let (vote_count, prev_mean) = if self.vote_count == 0 {
            (0, 0.0)
        } else {
            (self.vote_count, self.mean_value)
        };

        let grand_total = vote_count as f64 * rating_max * prev_mean;
        let vote_count = vote_count + 1;
        let hundred = rating_max * vote_count as f64;

        Self {
            item_id: self.item_id,
            vote_count,
            mean_value: (grand_total + raw_value) / hundred,
        }
    }

    /// Mean expressed on the attribute's own scale (e.g. stars)
    pub fn scaled_mean(&self, rating_max: f64) -> f64 {
        self.mean_value * rating_max
    }
}

/// A persisted aggregate row together with its composite key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub key: AggregateKey,
    pub vote_count: u64,
    pub mean_value: f64,
}

impl AggregateRecord {
    pub fn aggregate(&self) -> RatingAggregate {
        RatingAggregate {
            item_id: self.key.item_id,
            vote_count: self.vote_count,
            mean_value: self.mean_value,
        }
    }
}
