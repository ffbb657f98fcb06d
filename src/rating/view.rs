//! Values a rating widget needs to render one item

use crate::config::RatingConfig;
use crate::rating::aggregate::RatingAggregate;
use crate::types::{AttributeScope, ItemId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingView {
    pub item_id: ItemId,
    /// Widget name, unique per attribute and item
    pub name: String,
    /// Mean on the attribute's scale, snapped to half stars
    pub current_value: f64,
    pub rating_max: f64,
    pub vote_count: u64,
    /// Selectable vote values in ascending order
    pub options: Vec<f64>,
    pub voting_disabled: bool,
}

impl RatingView {
    pub fn new(
        scope: AttributeScope,
        config: &RatingConfig,
        aggregate: &RatingAggregate,
        voting_disabled: bool,
    ) -> Self {
        Self {
            item_id: aggregate.item_id,
            name: format!(
                "rating_attribute_{}_{}",
                scope.attribute_id, aggregate.item_id
            ),
            current_value: snap_to_half(aggregate.scaled_mean(config.rating_max)),
            rating_max: config.rating_max,
            vote_count: aggregate.vote_count,
            options: vote_options(config),
            voting_disabled,
        }
    }
}

fn snap_to_half(value: f64) -> f64 {
    (value / 0.5).round() * 0.5
}

/// Selectable vote values: one step up to and including `rating_max`
pub fn vote_options(config: &RatingConfig) -> Vec<f64> {
    let step = config.step();
    let steps = (config.rating_max / step).floor() as usize;
    (1..=steps).map(|n| n as f64 * step).collect()
}
