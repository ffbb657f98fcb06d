//! Rating aggregation core
//!
//! This module provides the running-mean vote aggregate, the storage
//! interface it persists through, session vote locks, and the per-attribute
//! rating store built on top of them.

pub mod aggregate;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use aggregate::{AggregateRecord, RatingAggregate};
pub use registry::{AttributeRegistry, StaticAttributeRegistry};
pub use session::{InMemorySessions, SessionState, SessionStore};
pub use storage::{AggregateStorage, InMemoryAggregateStorage};
pub use store::RatingStore;
pub use view::RatingView;
