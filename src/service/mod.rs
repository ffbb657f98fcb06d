//! Service layer for the star-tally rating service
//!
//! This module contains the main application state, HTTP serving and health
//! reporting for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
