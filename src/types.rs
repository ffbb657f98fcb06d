//! Common types used throughout the rating service

use serde::{Deserialize, Serialize};

/// Identifier of the model (item collection) owning an attribute
pub type ModelId = i64;

/// Identifier of a rating attribute within a model
pub type AttributeId = i64;

/// Identifier of a rated item
pub type ItemId = i64;

/// The (model, attribute) pair a rating store is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeScope {
    pub model_id: ModelId,
    pub attribute_id: AttributeId,
}

impl AttributeScope {
    pub fn new(model_id: ModelId, attribute_id: AttributeId) -> Self {
        Self {
            model_id,
            attribute_id,
        }
    }

    /// Composite key of one item's aggregate under this scope
    pub fn key(&self, item_id: ItemId) -> AggregateKey {
        AggregateKey {
            model_id: self.model_id,
            attribute_id: self.attribute_id,
            item_id,
        }
    }

    /// Session key recording that the current actor voted on `item_id`
    pub fn lock_key(&self, item_id: ItemId) -> String {
        format!(
            "vote_lock_{}_{}_{}",
            self.model_id, self.attribute_id, item_id
        )
    }
}

impl std::fmt::Display for AttributeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.model_id, self.attribute_id)
    }
}

/// Unique key of a persisted aggregate row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub model_id: ModelId,
    pub attribute_id: AttributeId,
    pub item_id: ItemId,
}

impl AggregateKey {
    pub fn scope(&self) -> AttributeScope {
        AttributeScope::new(self.model_id, self.attribute_id)
    }
}

/// Ordering requested for a rating sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Vote submission as received from a client
///
/// Every field is optional on the wire so that a missing field becomes a
/// validation failure instead of a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteRequest {
    pub attribute_id: Option<AttributeId>,
    pub model_id: Option<ModelId>,
    pub item_id: Option<ItemId>,
    pub rating: Option<f64>,
}

/// Result of applying a vote
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    /// The vote was folded into the aggregate
    Applied(crate::rating::RatingAggregate),
    /// The session had already voted on the item; nothing changed
    AlreadyVoted,
}

impl VoteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, VoteOutcome::Applied(_))
    }
}
