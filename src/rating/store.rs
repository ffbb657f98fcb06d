//! Rating store bound to one (model, attribute) pair
//!
//! Owns the vote algorithm on top of an [`AggregateStorage`] backend and
//! exposes the read, bulk-delete and order-by-rating operations used by the
//! rendering and listing collaborators.

use crate::error::{RatingError, Result};
use crate::rating::aggregate::RatingAggregate;
use crate::rating::session::SessionStore;
use crate::rating::storage::AggregateStorage;
use crate::types::{AttributeScope, ItemId, SortDirection, VoteOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Rating operations for a single attribute of a single model
#[derive(Clone)]
pub struct RatingStore {
    scope: AttributeScope,
    storage: Arc<dyn AggregateStorage>,
}

impl RatingStore {
    pub fn new(scope: AttributeScope, storage: Arc<dyn AggregateStorage>) -> Self {
        Self { scope, storage }
    }

    pub fn scope(&self) -> AttributeScope {
        self.scope
    }

    /// Get the aggregate of every requested item.
    ///
    /// Items nobody voted on yet come back as zero aggregates, so the result
    /// always has one entry per distinct input id.
    pub async fn get_aggregates(
        &self,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, RatingAggregate>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut aggregates = self
            .storage
            .get_aggregates(self.scope, item_ids)
            .await
            .map_err(|e| {
                error!("Failed to read aggregates for {}: {}", self.scope, e);
                RatingError::from(e)
            })?;

        for item_id in item_ids {
            aggregates
                .entry(*item_id)
                .or_insert_with(|| RatingAggregate::zero(*item_id));
        }

        debug!(
            "Loaded {} aggregates for attribute {}",
            aggregates.len(),
            self.scope
        );
        Ok(aggregates)
    }

    /// Whether `session` already voted on `item_id`
    pub fn has_voted(&self, session: &dyn SessionStore, item_id: ItemId) -> bool {
        session.get(&self.scope.lock_key(item_id))
    }

    /// Fold a raw vote into the item's running mean.
    ///
    /// A session holding the vote lock for the item is ignored silently and
    /// gets [`VoteOutcome::AlreadyVoted`]. With `lock` set, the lock is
    /// claimed before the write so concurrent votes of one session on one
    /// item apply at most once; a failed or cancelled write releases it.
    pub async fn apply_vote(
        &self,
        session: &dyn SessionStore,
        item_id: ItemId,
        raw_value: f64,
        rating_max: f64,
        lock: bool,
    ) -> Result<VoteOutcome> {
        let lock_key = self.scope.lock_key(item_id);
        let claim = if lock {
            if !session.try_claim(&lock_key) {
                return Ok(self.already_voted(item_id));
            }
            Some(LockClaim::new(session, &lock_key))
        } else if session.get(&lock_key) {
            return Ok(self.already_voted(item_id));
        } else {
            None
        };

        let update = move |current: RatingAggregate| current.with_vote(raw_value, rating_max);
        let aggregate = self
            .storage
            .upsert_with(self.scope.key(item_id), &update)
            .await
            .map_err(|e| {
                error!(
                    "Failed to store vote on item {} of attribute {}: {}",
                    item_id, self.scope, e
                );
                RatingError::from(e)
            })?;

        if let Some(claim) = claim {
            claim.commit();
        }

        info!(
            "Vote {} applied to item {} of attribute {} - votes: {}, mean: {:.4}",
            raw_value, item_id, self.scope, aggregate.vote_count, aggregate.mean_value
        );
        Ok(VoteOutcome::Applied(aggregate))
    }

    fn already_voted(&self, item_id: ItemId) -> VoteOutcome {
        debug!(
            "Ignoring repeated vote on item {} of attribute {}",
            item_id, self.scope
        );
        VoteOutcome::AlreadyVoted
    }

    /// Delete the votes of the given items
    pub async fn clear_aggregates(&self, item_ids: &[ItemId]) -> Result<()> {
        let removed = self
            .storage
            .delete_aggregates(self.scope, item_ids)
            .await?;

        info!(
            "Cleared {} aggregates of attribute {} ({} items requested)",
            removed,
            self.scope,
            item_ids.len()
        );
        Ok(())
    }

    /// Delete every aggregate of this attribute
    pub async fn destroy_all(&self) -> Result<()> {
        let removed = self.storage.delete_scope(self.scope).await?;

        info!("Destroyed attribute {} ({} aggregates)", self.scope, removed);
        Ok(())
    }

    /// Reorder `item_ids` by mean rating.
    ///
    /// Rated items are stably sorted by `mean_value`; unrated items keep
    /// their input order and go after the rated block for `Desc` and before
    /// it for `Asc`.
    pub async fn order_by_rating(
        &self,
        item_ids: &[ItemId],
        direction: SortDirection,
    ) -> Result<Vec<ItemId>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.storage.get_aggregates(self.scope, item_ids).await?;
        Ok(order_ids(item_ids, &stored, direction))
    }
}

/// Stable partition of `item_ids` into rated (sorted) and unrated ids
pub fn order_ids(
    item_ids: &[ItemId],
    aggregates: &HashMap<ItemId, RatingAggregate>,
    direction: SortDirection,
) -> Vec<ItemId> {
    let mut rated: Vec<(ItemId, f64)> = Vec::new();
    let mut unrated: Vec<ItemId> = Vec::new();

    for item_id in item_ids {
        match aggregates.get(item_id).filter(|aggregate| !aggregate.is_zero()) {
            Some(aggregate) => rated.push((*item_id, aggregate.mean_value)),
            None => unrated.push(*item_id),
        }
    }

    // sort_by is stable, equal means keep their input order
    rated.sort_by(|a, b| {
        let ordering = a.1.total_cmp(&b.1);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    let rated = rated.into_iter().map(|(item_id, _)| item_id);
    match direction {
        SortDirection::Desc => rated.chain(unrated).collect(),
        SortDirection::Asc => unrated.into_iter().chain(rated).collect(),
    }
}

/// A vote lock claimed ahead of the aggregate write, released on drop unless committed
struct LockClaim<'a> {
    session: &'a dyn SessionStore,
    key: &'a str,
    committed: bool,
}

impl<'a> LockClaim<'a> {
    fn new(session: &'a dyn SessionStore, key: &'a str) -> Self {
        Self {
            session,
            key,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for LockClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!("Releasing vote lock '{}' after a failed write", self.key);
            self.session.set(self.key, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::rating::session::{MockSessionStore, SessionState};
    use crate::rating::storage::{AggregateUpdate, InMemoryAggregateStorage};
    use crate::types::AggregateKey;
    use async_trait::async_trait;

    /// Backend whose writes always fail
    struct ReadOnlyStorage;

    #[async_trait]
    impl AggregateStorage for ReadOnlyStorage {
        async fn get_aggregates(
            &self,
            _scope: AttributeScope,
            _item_ids: &[ItemId],
        ) -> std::result::Result<HashMap<ItemId, RatingAggregate>, StorageError> {
            Ok(HashMap::new())
        }

        async fn upsert_with(
            &self,
            _key: AggregateKey,
            _update: AggregateUpdate<'_>,
        ) -> std::result::Result<RatingAggregate, StorageError> {
            Err(StorageError::WriteFailed {
                message: "read-only replica".to_string(),
            })
        }

        async fn delete_aggregates(
            &self,
            _scope: AttributeScope,
            _item_ids: &[ItemId],
        ) -> std::result::Result<usize, StorageError> {
            Ok(0)
        }

        async fn delete_scope(
            &self,
            _scope: AttributeScope,
        ) -> std::result::Result<usize, StorageError> {
            Ok(0)
        }

        async fn count(&self) -> std::result::Result<usize, StorageError> {
            Ok(0)
        }
    }

    fn create_test_store() -> RatingStore {
        RatingStore::new(
            AttributeScope::new(1, 2),
            Arc::new(InMemoryAggregateStorage::new()),
        )
    }

    fn aggregate(item_id: ItemId, mean_value: f64) -> (ItemId, RatingAggregate) {
        (
            item_id,
            RatingAggregate {
                item_id,
                vote_count: 1,
                mean_value,
            },
        )
    }

    #[tokio::test]
    async fn test_votes_update_running_mean() {
        let store = create_test_store();
        let session = SessionState::new();

        let outcome = store.apply_vote(&session, 7, 3.0, 5.0, false).await.unwrap();
        match outcome {
            VoteOutcome::Applied(aggregate) => {
                assert_eq!(aggregate.vote_count, 1);
                assert!((aggregate.mean_value - 0.6).abs() < 1e-12);
            }
            VoteOutcome::AlreadyVoted => panic!("first vote must be applied"),
        }

        store.apply_vote(&session, 7, 5.0, 5.0, false).await.unwrap();
        let aggregates = store.get_aggregates(&[7]).await.unwrap();
        assert_eq!(aggregates[&7].vote_count, 2);
        assert!((aggregates[&7].mean_value - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_locked_session_is_ignored() {
        let store = create_test_store();
        let session = SessionState::new();

        assert!(store.apply_vote(&session, 1, 4.0, 5.0, true).await.unwrap().is_applied());
        assert!(store.has_voted(&session, 1));

        for _ in 0..3 {
            let outcome = store.apply_vote(&session, 1, 1.0, 5.0, true).await.unwrap();
            assert_eq!(outcome, VoteOutcome::AlreadyVoted);
        }

        let aggregates = store.get_aggregates(&[1]).await.unwrap();
        assert_eq!(aggregates[&1].vote_count, 1);
        assert!((aggregates[&1].mean_value - 0.8).abs() < 1e-12);

        // The lock is per item
        assert!(store.apply_vote(&session, 2, 1.0, 5.0, true).await.unwrap().is_applied());
    }

    #[tokio::test]
    async fn test_locking_vote_claims_before_writing() {
        let store = create_test_store();
        let mut session = MockSessionStore::new();
        session
            .expect_try_claim()
            .withf(|key| key == "vote_lock_1_2_3")
            .times(1)
            .return_const(false);
        session.expect_get().never();
        session.expect_set().never();

        let outcome = store.apply_vote(&session, 3, 5.0, 5.0, true).await.unwrap();
        assert_eq!(outcome, VoteOutcome::AlreadyVoted);
        assert!(store.get_aggregates(&[3]).await.unwrap()[&3].is_zero());
    }

    #[tokio::test]
    async fn test_failed_write_releases_lock() {
        let store = RatingStore::new(AttributeScope::new(1, 2), Arc::new(ReadOnlyStorage));
        let session = SessionState::new();

        let error = store.apply_vote(&session, 4, 5.0, 5.0, true).await.unwrap_err();
        assert!(matches!(error, RatingError::Storage(_)));
        assert!(!store.has_voted(&session, 4));

        // The session can vote again once storage recovers
        assert!(session.try_claim("vote_lock_1_2_4"));
    }

    #[tokio::test]
    async fn test_unlocked_vote_does_not_touch_session() {
        let store = create_test_store();
        let mut session = MockSessionStore::new();
        session
            .expect_get()
            .withf(|key| key == "vote_lock_1_2_9")
            .times(1)
            .return_const(false);
        session.expect_set().never();

        store.apply_vote(&session, 9, 2.0, 5.0, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_items_read_as_zero() {
        let store = create_test_store();

        assert!(store.get_aggregates(&[]).await.unwrap().is_empty());

        let aggregates = store.get_aggregates(&[3, 4]).await.unwrap();
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[&3], RatingAggregate::zero(3));
        assert_eq!(aggregates[&4], RatingAggregate::zero(4));
    }

    #[tokio::test]
    async fn test_clear_then_read_is_zero() {
        let store = create_test_store();
        let session = SessionState::new();

        store.apply_vote(&session, 1, 5.0, 5.0, false).await.unwrap();
        store.apply_vote(&session, 2, 2.0, 5.0, false).await.unwrap();

        store.clear_aggregates(&[1, 2, 3]).await.unwrap();
        store.clear_aggregates(&[1, 2, 3]).await.unwrap();

        let aggregates = store.get_aggregates(&[1, 2, 3]).await.unwrap();
        assert!(aggregates.values().all(|aggregate| aggregate.is_zero()));
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let store = create_test_store();
        let session = SessionState::new();

        store.apply_vote(&session, 1, 5.0, 5.0, false).await.unwrap();
        store.destroy_all().await.unwrap();

        let aggregates = store.get_aggregates(&[1]).await.unwrap();
        assert!(aggregates[&1].is_zero());
    }

    #[test]
    fn test_order_desc_puts_unrated_last() {
        let aggregates: HashMap<_, _> =
            [aggregate(1, 0.8), aggregate(2, 0.3), aggregate(4, 0.3)].into_iter().collect();

        let ordered = order_ids(&[1, 2, 3, 4], &aggregates, SortDirection::Desc);
        assert_eq!(ordered, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_order_asc_puts_unrated_first() {
        let aggregates: HashMap<_, _> =
            [aggregate(1, 0.8), aggregate(2, 0.3), aggregate(4, 0.3)].into_iter().collect();

        let ordered = order_ids(&[5, 1, 2, 3, 4], &aggregates, SortDirection::Asc);
        assert_eq!(ordered, vec![5, 3, 2, 4, 1]);
    }

    #[tokio::test]
    async fn test_order_by_rating_uses_stored_means() {
        let store = create_test_store();
        let session = SessionState::new();

        store.apply_vote(&session, 10, 1.0, 5.0, false).await.unwrap();
        store.apply_vote(&session, 20, 5.0, 5.0, false).await.unwrap();

        let ordered = store
            .order_by_rating(&[10, 30, 20], SortDirection::Desc)
            .await
            .unwrap();
        assert_eq!(ordered, vec![20, 10, 30]);

        assert!(store
            .order_by_rating(&[], SortDirection::Asc)
            .await
            .unwrap()
            .is_empty());
    }
}
