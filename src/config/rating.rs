//! Rating attribute configuration

use crate::error::{RatingError, Result};
use crate::types::{AttributeId, AttributeScope, ModelId};
use serde::{Deserialize, Serialize};

/// Settings of one rating attribute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Upper bound of the scale, e.g. 5 stars
    pub rating_max: f64,
    /// Whether half stars can be voted
    #[serde(default)]
    pub allow_half_steps: bool,
    /// Whether lists may be ordered by this attribute
    #[serde(default = "default_sortable")]
    pub sortable: bool,
}

fn default_sortable() -> bool {
    true
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            rating_max: 5.0,
            allow_half_steps: false,
            sortable: default_sortable(),
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.rating_max.is_finite() || self.rating_max <= 0.0 {
            return Err(RatingError::configuration(format!(
                "rating_max must be positive, got {}",
                self.rating_max
            )));
        }
        Ok(())
    }

    /// Step between two selectable vote values
    pub fn step(&self) -> f64 {
        if self.allow_half_steps {
            0.5
        } else {
            1.0
        }
    }

    /// Check that `rating` is a vote this attribute accepts
    pub fn check_vote(&self, rating: f64) -> Result<()> {
        if !rating.is_finite() {
            return Err(RatingError::validation("rating must be a number"));
        }
        if rating < 0.0 || rating > self.rating_max {
            return Err(RatingError::validation(format!(
                "rating {} outside 0..{}",
                rating, self.rating_max
            )));
        }
        if (rating / self.step()).fract() != 0.0 {
            return Err(RatingError::validation(format!(
                "rating {} is not a multiple of {}",
                rating,
                self.step()
            )));
        }
        Ok(())
    }
}

/// A rating attribute as listed in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSettings {
    pub model_id: ModelId,
    pub attribute_id: AttributeId,
    #[serde(flatten)]
    pub rating: RatingConfig,
}

impl AttributeSettings {
    pub fn scope(&self) -> AttributeScope {
        AttributeScope::new(self.model_id, self.attribute_id)
    }
}
