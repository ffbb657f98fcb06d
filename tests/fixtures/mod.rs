//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use star_tally::config::{AppConfig, AttributeSettings, RatingConfig};
use star_tally::rating::storage::AggregateUpdate;
use star_tally::rating::AggregateStorage;
use star_tally::service::AppState;
use star_tally::types::{AggregateKey, AttributeScope, ItemId};
use star_tally::{RatingAggregate, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Model id used by every test attribute
pub const MODEL_ID: i64 = 1;

/// Five-star attribute, whole steps, sortable
pub const STARS: i64 = 10;

/// Ten-point attribute with half steps, not sortable
pub const POINTS: i64 = 20;

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.ratings.attributes = vec![
        AttributeSettings {
            model_id: MODEL_ID,
            attribute_id: STARS,
            rating: RatingConfig {
                rating_max: 5.0,
                allow_half_steps: false,
                sortable: true,
            },
        },
        AttributeSettings {
            model_id: MODEL_ID,
            attribute_id: POINTS,
            rating: RatingConfig {
                rating_max: 10.0,
                allow_half_steps: true,
                sortable: false,
            },
        },
    ];
    config
}

/// Running application state backed by in-memory storage
pub async fn create_test_app() -> Arc<AppState> {
    let state = AppState::new(test_config()).expect("test config is valid");
    state.mark_running(true).await;
    Arc::new(state)
}

/// Running application state backed by the given storage
pub async fn create_test_app_with_storage(storage: Arc<dyn AggregateStorage>) -> Arc<AppState> {
    let state = AppState::with_storage(test_config(), storage).expect("test config is valid");
    state.mark_running(true).await;
    Arc::new(state)
}

/// Storage whose every call fails as if the backend were unreachable
#[derive(Debug, Default)]
pub struct UnreachableStorage {
    calls: AtomicUsize,
}

impl UnreachableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable {
            message: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl AggregateStorage for UnreachableStorage {
    async fn get_aggregates(
        &self,
        _scope: AttributeScope,
        _item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, RatingAggregate>, StorageError> {
        self.fail()
    }

    async fn upsert_with(
        &self,
        _key: AggregateKey,
        _update: AggregateUpdate<'_>,
    ) -> Result<RatingAggregate, StorageError> {
        self.fail()
    }

    async fn delete_aggregates(
        &self,
        _scope: AttributeScope,
        _item_ids: &[ItemId],
    ) -> Result<usize, StorageError> {
        self.fail()
    }

    async fn delete_scope(&self, _scope: AttributeScope) -> Result<usize, StorageError> {
        self.fail()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.fail()
    }
}

/// Storage that yields to the scheduler in the middle of every update, so
/// concurrent votes interleave as much as the backend allows
#[derive(Debug, Default)]
pub struct YieldingStorage {
    inner: star_tally::InMemoryAggregateStorage,
}

impl YieldingStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateStorage for YieldingStorage {
    async fn get_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<HashMap<ItemId, RatingAggregate>, StorageError> {
        tokio::task::yield_now().await;
        self.inner.get_aggregates(scope, item_ids).await
    }

    async fn upsert_with(
        &self,
        key: AggregateKey,
        update: AggregateUpdate<'_>,
    ) -> Result<RatingAggregate, StorageError> {
        tokio::task::yield_now().await;
        let aggregate = self.inner.upsert_with(key, update).await;
        tokio::task::yield_now().await;
        aggregate
    }

    async fn delete_aggregates(
        &self,
        scope: AttributeScope,
        item_ids: &[ItemId],
    ) -> Result<usize, StorageError> {
        self.inner.delete_aggregates(scope, item_ids).await
    }

    async fn delete_scope(&self, scope: AttributeScope) -> Result<usize, StorageError> {
        self.inner.delete_scope(scope).await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.inner.count().await
    }
}
