//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the star-tally
//! service, including the liveness probe and a detailed health report.

use crate::service::app::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub rating_attributes: usize,
    pub stored_aggregates: usize,
    pub sessions: usize,
    pub uptime_seconds: i64,
}

impl HealthCheck {
    /// Perform a health check of the service
    pub async fn check(app_state: &AppState) -> Self {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let (storage_check, stored_aggregates) = Self::check_storage(app_state).await;
        if storage_check.status != HealthStatus::Healthy && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(storage_check);

        let stats = ServiceStats {
            rating_attributes: app_state.gate().registry().scopes().len(),
            stored_aggregates,
            sessions: app_state.sessions().session_count(),
            uptime_seconds: (chrono::Utc::now() - app_state.started_at()).num_seconds(),
        };

        HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        }
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check that the aggregate storage answers
    async fn check_storage(app_state: &AppState) -> (ComponentCheck, usize) {
        let start = std::time::Instant::now();

        let (status, message, count) = match app_state.gate().storage().count().await {
            Ok(count) => {
                app_state.metrics().stored_aggregates.set(count as i64);
                (HealthStatus::Healthy, None, count)
            }
            Err(e) => {
                error!("Aggregate storage health check failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()), 0)
            }
        };

        let check = ComponentCheck {
            name: "aggregate_storage".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        (check, count)
    }
}

/// Detailed health report
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    let health = HealthCheck::check(&state).await;
    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(health))
}

/// Liveness probe
pub async fn alive_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_running().await {
        (StatusCode::OK, "Alive")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not running")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn test_health_reflects_running_state() {
        let state = AppState::new(AppConfig::default()).unwrap();

        let health = HealthCheck::check(&state).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);

        state.mark_running(true).await;
        let health = HealthCheck::check(&state).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.stored_aggregates, 0);
        assert_eq!(health.checks.len(), 2);
    }
}
