//! Star Tally - star-rating attribute service
//!
//! This crate aggregates user votes on content items into per-item running
//! means, guards against repeat votes with session locks, and orders item
//! lists by rating. A small HTTP gate accepts votes from clients.

pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod types;

// Re-export commonly used types and traits
pub use error::{RatingError, Result, StorageError};
pub use types::*;

// Re-export key components
pub use gate::VoteGate;
pub use rating::{AggregateStorage, InMemoryAggregateStorage, RatingAggregate, RatingStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
