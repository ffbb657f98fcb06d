//! Aggregate storage interface and the in-memory implementation
//!
//! The store never performs a read followed by a separate write: every vote
//! goes through [`AggregateStorage::upsert_with`], which a backend must run
//! as one atomic step per key (row lock, conditional update, or a per-key
//! mutex as done here).

use crate::error::StorageError;
use crate::rating::aggregate::{AggregateRecord, RatingAggregate};
use crate::types::{AggregateKey, AttributeScope, ItemId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Computes the new aggregate from the current one (zero if absent)
pub type AggregateUpdate<'a> = &'a (dyn Fn(RatingAggregate) -> RatingAggregate + Send + Sync);

/// Trait for aggregate persistence
#[async_trait]
pub trait AggregateStorage: Send + Sync {
    /// Get the stored aggregates among `item_ids`; items without a row are omitted
    async fn get_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, RatingAggregate>, StorageError>;

    /// Atomically read, recompute and write one aggregate, inserting it if missing
    async fn upsert_with(
        &self,
        key: AggregateKey,
        update: AggregateUpdate<'_>,
    ) -> Result<RatingAggregate, StorageError>;

    /// Delete the aggregates of the given items, returning how many rows existed
    async fn delete_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<usize, StorageError>;

    /// Delete every aggregate owned by `scope`
    async fn delete_scope(&self, scope: AttributeScope) -> Result<usize, StorageError>;

    /// Total number of stored aggregates
    async fn count(&self) -> Result<usize, StorageError>;
}

#[derive(Debug)]
struct Slot {
    aggregate: RatingAggregate,
    // Set once the slot has been removed from the index; writers must retry.
    detached: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// In-memory aggregate storage with one mutex per key
///
/// The key index is only write-locked to add or remove slots, so votes on
/// different items never wait on each other's computation.
#[derive(Debug, Default)]
pub struct InMemoryAggregateStorage {
    slots: RwLock<HashMap<AggregateKey, SlotRef>>,
}

impl InMemoryAggregateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored rows (for admin/debugging)
    pub fn records(&self) -> Result<Vec<AggregateRecord>, StorageError> {
        let slots = self.slots.read().map_err(|_| poisoned("aggregate index"))?;

        let mut records = Vec::with_capacity(slots.len());
        for (key, cell) in slots.iter() {
            let slot = cell.lock().map_err(|_| poisoned("aggregate slot"))?;
            if slot.aggregate.is_zero() {
                continue;
            }
            records.push(AggregateRecord {
                key: *key,
                vote_count: slot.aggregate.vote_count,
                mean_value: slot.aggregate.mean_value,
            });
        }

        Ok(records)
    }

    fn slot(&self, key: AggregateKey) -> Result<SlotRef, StorageError> {
        {
            let slots = self.slots.read().map_err(|_| poisoned("aggregate index"))?;
            if let Some(slot) = slots.get(&key) {
                return Ok(slot.clone());
            }
        }

        let mut slots = self.slots.write().map_err(|_| poisoned("aggregate index"))?;
        let slot = slots.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                aggregate: RatingAggregate::zero(key.item_id),
                detached: false,
            }))
        });

        Ok(slot.clone())
    }

    fn remove_where(
        &self,
        mut predicate: impl FnMut(&AggregateKey) -> bool,
    ) -> Result<usize, StorageError> {
        let mut slots = self.slots.write().map_err(|_| poisoned("aggregate index"))?;

        let keys: Vec<AggregateKey> = slots.keys().filter(|key| predicate(*key)).copied().collect();

        let mut removed = 0;
        for key in keys {
            if let Some(cell) = slots.remove(&key) {
                let mut slot = cell.lock().map_err(|_| poisoned("aggregate slot"))?;
                slot.detached = true;
                if !slot.aggregate.is_zero() {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl AggregateStorage for InMemoryAggregateStorage {
    async fn get_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, RatingAggregate>, StorageError> {
        let slots = self.slots.read().map_err(|_| poisoned("aggregate index"))?;

        let mut result = HashMap::new();
        for item_id in item_ids {
            if let Some(cell) = slots.get(&scope.key(*item_id)) {
                let slot = cell.lock().map_err(|_| poisoned("aggregate slot"))?;
                if !slot.aggregate.is_zero() {
                    result.insert(*item_id, slot.aggregate);
                }
            }
        }

        Ok(result)
    }

    async fn upsert_with(
        &self,
        key: AggregateKey,
        update: AggregateUpdate<'_>,
    ) -> Result<RatingAggregate, StorageError> {
        loop {
            let cell = self.slot(key)?;
            let mut slot = cell.lock().map_err(|_| poisoned("aggregate slot"))?;

            if slot.detached {
                // Deleted between lookup and lock; start over on a fresh slot.
                debug!("Aggregate slot for {:?} was detached, retrying", key);
                continue;
            }

            let updated = update(slot.aggregate);
            slot.aggregate = updated;
            return Ok(updated);
        }
    }

    async fn delete_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<usize, StorageError> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        self.remove_where(|key| key.scope() == scope && item_ids.contains(&key.item_id))
    }

    async fn delete_scope(&self, scope: AttributeScope) -> Result<usize, StorageError> {
        self.remove_where(|key| key.scope() == scope)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records()?.len())
    }
}

fn poisoned(resource: &str) -> StorageError {
    StorageError::LockPoisoned {
        resource: resource.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_vote(vote: f64) -> impl Fn(RatingAggregate) -> RatingAggregate + Send + Sync {
        move |current: RatingAggregate| current.with_vote(vote, 5.0)
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let storage = InMemoryAggregateStorage::new();
        let scope = AttributeScope::new(1, 1);

        let first = storage.upsert_with(scope.key(10), &add_vote(3.0)).await.unwrap();
        assert_eq!(first.vote_count, 1);

        let second = storage.upsert_with(scope.key(10), &add_vote(5.0)).await.unwrap();
        assert_eq!(second.vote_count, 2);
        assert!((second.mean_value - 0.8).abs() < 1e-12);

        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_aggregates_omits_missing_rows() {
        let storage = InMemoryAggregateStorage::new();
        let scope = AttributeScope::new(1, 1);

        storage.upsert_with(scope.key(1), &add_vote(4.0)).await.unwrap();

        let found = storage.get_aggregates(scope, &[1, 2]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&1));
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let storage = InMemoryAggregateStorage::new();
        let first = AttributeScope::new(1, 1);
        let second = AttributeScope::new(1, 2);

        storage.upsert_with(first.key(1), &add_vote(4.0)).await.unwrap();
        storage.upsert_with(second.key(1), &add_vote(2.0)).await.unwrap();

        assert_eq!(storage.delete_scope(first).await.unwrap(), 1);
        assert!(storage.get_aggregates(first, &[1]).await.unwrap().is_empty());
        assert_eq!(storage.get_aggregates(second, &[1]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = InMemoryAggregateStorage::new();
        let scope = AttributeScope::new(2, 3);

        storage.upsert_with(scope.key(5), &add_vote(1.0)).await.unwrap();

        assert_eq!(storage.delete_aggregates(scope, &[5, 6]).await.unwrap(), 1);
        assert_eq!(storage.delete_aggregates(scope, &[5, 6]).await.unwrap(), 0);
        assert_eq!(storage.delete_aggregates(scope, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vote_after_delete_starts_fresh() {
        let storage = InMemoryAggregateStorage::new();
        let scope = AttributeScope::new(1, 1);

        storage.upsert_with(scope.key(1), &add_vote(5.0)).await.unwrap();
        storage.delete_aggregates(scope, &[1]).await.unwrap();

        let aggregate = storage.upsert_with(scope.key(1), &add_vote(1.0)).await.unwrap();
        assert_eq!(aggregate.vote_count, 1);
        assert!((aggregate.mean_value - 0.2).abs() < 1e-12);
    }
}
