//! Vote gate: validation and delegation of inbound vote submissions
//!
//! The gate checks that a submission carries every required field, resolves
//! the attribute through the registry, and hands the vote to the attribute's
//! rating store with the session lock enabled. It performs no recovery;
//! store errors are returned unchanged.

use crate::config::RatingConfig;
use crate::error::{RatingError, Result};
use crate::rating::{AggregateStorage, AttributeRegistry, RatingStore, SessionStore};
use crate::types::{AttributeId, AttributeScope, ModelId, VoteOutcome, VoteRequest};
use std::sync::Arc;
use tracing::{info, warn};

/// A vote submission with every required field present
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedVote {
    pub scope: AttributeScope,
    pub item_id: i64,
    pub rating: f64,
}

impl TryFrom<VoteRequest> for ValidatedVote {
    type Error = RatingError;

    fn try_from(request: VoteRequest) -> Result<Self> {
        let missing = [
            ("attribute_id", request.attribute_id.is_none()),
            ("model_id", request.model_id.is_none()),
            ("item_id", request.item_id.is_none()),
            ("rating", request.rating.is_none()),
        ]
        .into_iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(field, _)| field)
        .collect::<Vec<_>>();

        match (
            request.attribute_id,
            request.model_id,
            request.item_id,
            request.rating,
        ) {
            (Some(attribute_id), Some(model_id), Some(item_id), Some(rating)) => Ok(Self {
                scope: AttributeScope::new(model_id, attribute_id),
                item_id,
                rating,
            }),
            _ => Err(RatingError::validation(format!(
                "Invalid request, missing {}.",
                missing.join(", ")
            ))),
        }
    }
}

/// Front end translating vote submissions into rating store calls
pub struct VoteGate {
    registry: Arc<dyn AttributeRegistry>,
    storage: Arc<dyn AggregateStorage>,
}

impl VoteGate {
    pub fn new(registry: Arc<dyn AttributeRegistry>, storage: Arc<dyn AggregateStorage>) -> Self {
        Self { registry, storage }
    }

    /// Resolve the rating store and settings of an attribute
    pub fn resolve(
        &self,
        model_id: ModelId,
        attribute_id: AttributeId,
    ) -> Result<(RatingStore, RatingConfig)> {
        if !self.registry.has_model(model_id) {
            return Err(RatingError::configuration("No model."));
        }

        let config = self
            .registry
            .resolve(model_id, attribute_id)
            .ok_or_else(|| RatingError::configuration("No attribute."))?;

        let store = RatingStore::new(
            AttributeScope::new(model_id, attribute_id),
            self.storage.clone(),
        );
        Ok((store, config))
    }

    /// Validate a submission and apply it as a locking vote
    pub async fn submit(
        &self,
        session: &dyn SessionStore,
        request: VoteRequest,
    ) -> Result<VoteOutcome> {
        let vote = ValidatedVote::try_from(request).map_err(|e| {
            warn!("Rejected vote submission: {}", e);
            e
        })?;

        let (store, config) = self.resolve(vote.scope.model_id, vote.scope.attribute_id)?;
        config.check_vote(vote.rating)?;

        let outcome = store
            .apply_vote(session, vote.item_id, vote.rating, config.rating_max, true)
            .await?;

        if outcome == VoteOutcome::AlreadyVoted {
            info!(
                "Session already voted on item {} of attribute {}",
                vote.item_id, vote.scope
            );
        }
        Ok(outcome)
    }

    pub fn registry(&self) -> Arc<dyn AttributeRegistry> {
        self.registry.clone()
    }

    pub fn storage(&self) -> Arc<dyn AggregateStorage> {
        self.storage.clone()
    }
}
