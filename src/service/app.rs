//! Main application state and service coordination
//!
//! This module contains the AppState that wires the attribute registry,
//! aggregate storage, sessions and metrics together and serves the HTTP
//! router.

use crate::config::AppConfig;
use crate::gate::{create_router, VoteGate};
use crate::metrics::MetricsCollector;
use crate::rating::{AggregateStorage, InMemoryAggregateStorage, InMemorySessions};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("HTTP server error: {message}")]
    Server { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Vote validation and delegation
    gate: Arc<VoteGate>,

    /// Sessions carrying vote locks
    sessions: Arc<InMemorySessions>,

    /// Metrics for monitoring
    metrics: Arc<MetricsCollector>,

    /// Service start time
    started_at: DateTime<Utc>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with in-memory storage
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_storage(config, Arc::new(InMemoryAggregateStorage::new()))
    }

    /// Initialize the application on top of the given storage backend
    pub fn with_storage(
        config: AppConfig,
        storage: Arc<dyn AggregateStorage>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing star-tally rating service");

        let registry = config
            .attribute_registry()
            .map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?;

        let metrics = MetricsCollector::new().map_err(|e| ServiceError::Initialization {
            message: format!("Failed to create metrics collector: {}", e),
        })?;

        info!(
            "Configuration: service={}, attributes={}",
            config.service.name,
            config.ratings.attributes.len()
        );

        Ok(Self {
            gate: Arc::new(VoteGate::new(Arc::new(registry), storage)),
            sessions: Arc::new(InMemorySessions::with_ttl(config.session_ttl())),
            metrics: Arc::new(metrics),
            started_at: Utc::now(),
            is_running: Arc::new(RwLock::new(false)),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<VoteGate> {
        &self.gate
    }

    pub fn sessions(&self) -> &Arc<InMemorySessions> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Serve the HTTP router until `shutdown` resolves
    pub async fn serve<F>(self: Arc<Self>, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.service.http_host, self.config.service.http_port
        )
        .parse()
        .map_err(|e| ServiceError::Configuration {
            message: format!("Invalid HTTP address: {}", e),
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Server {
                message: format!("Failed to bind {}: {}", addr, e),
            })?;

        let app = create_router(self.clone());
        *self.is_running.write().await = true;
        info!("HTTP server listening on http://{}", addr);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServiceError::Server {
                message: e.to_string(),
            });

        *self.is_running.write().await = false;
        info!("HTTP server stopped");
        result
    }

    /// Mark the service as running without binding a socket (tests, health probes)
    pub async fn mark_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeSettings, RatingConfig};

    #[tokio::test]
    async fn test_app_state_initialization() {
        let mut config = AppConfig::default();
        config.ratings.attributes.push(AttributeSettings {
            model_id: 1,
            attribute_id: 1,
            rating: RatingConfig::default(),
        });

        let state = AppState::new(config).unwrap();
        assert!(!state.is_running().await);
        assert!(state.gate().resolve(1, 1).is_ok());

        state.mark_running(true).await;
        assert!(state.is_running().await);
    }

    #[test]
    fn test_invalid_attributes_fail_initialization() {
        let mut config = AppConfig::default();
        config.ratings.attributes.push(AttributeSettings {
            model_id: 1,
            attribute_id: 1,
            rating: RatingConfig {
                rating_max: -1.0,
                ..RatingConfig::default()
            },
        });

        assert!(matches!(
            AppState::new(config),
            Err(ServiceError::Configuration { .. })
        ));
    }
}
