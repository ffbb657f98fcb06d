//! HTTP routes of the vote gate and the rating read surface
//!
//! Failures answer with a short `Rating Ajax: <reason>` diagnostic: 400 for
//! validation and configuration errors, 500 for storage errors.

use crate::error::RatingError;
use crate::rating::{RatingView, SessionState};
use crate::service::app::AppState;
use crate::service::health::{alive_handler, health_handler};
use crate::types::{ItemId, SortDirection, VoteOutcome, VoteRequest};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

impl IntoResponse for RatingError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let reason = match &self {
            RatingError::Configuration { message } => message.clone(),
            RatingError::Validation { reason } => reason.clone(),
            RatingError::Storage(_) => "Storage failure.".to_string(),
        };

        (status, format!("Rating Ajax: {}", reason)).into_response()
    }
}

/// Create the router with vote, rating and monitoring endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let permits = Arc::new(Semaphore::new(
        state.config().service.max_concurrent_operations,
    ));

    Router::new()
        .route("/", get(root_handler))
        .route("/vote", post(vote_handler))
        .route("/ratings/{model_id}/{attribute_id}", get(ratings_handler))
        .route(
            "/ratings/{model_id}/{attribute_id}/order",
            post(order_handler),
        )
        .route("/health", get(health_handler))
        .route("/alive", get(alive_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(permits, limit_concurrency))
        .with_state(state)
}

/// Hold one permit per in-flight request
async fn limit_concurrency(
    State(permits): State<Arc<Semaphore>>,
    request: Request,
    next: Next,
) -> Response {
    match permits.acquire_owned().await {
        Ok(_permit) => next.run(request).await,
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "Service shutting down").into_response(),
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "star-tally",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/vote",
            "/ratings/{model_id}/{attribute_id}",
            "/ratings/{model_id}/{attribute_id}/order",
            "/health",
            "/alive",
            "/metrics"
        ]
    }))
}

/// Session id carried by the configured header
fn supplied_session_id<'a>(state: &AppState, headers: &'a HeaderMap) -> Option<&'a str> {
    headers
        .get(state.config().service.session_header.as_str())
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Registered session for a supplied id; otherwise a fresh anonymous session
/// that is never registered, so its lock is not observed again
fn voting_session(state: &AppState, headers: &HeaderMap) -> (String, Arc<SessionState>) {
    match supplied_session_id(state, headers) {
        Some(session_id) => (
            session_id.to_string(),
            state.sessions().session(session_id),
        ),
        None => (
            uuid::Uuid::new_v4().to_string(),
            Arc::new(SessionState::new()),
        ),
    }
}

fn with_session_header(state: &AppState, session_id: &str, mut response: Response) -> Response {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(state.config().service.session_header.as_str()),
        HeaderValue::from_str(session_id),
    ) {
        response.headers_mut().insert(name, value);
    }
    response
}

async fn vote_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Response {
    let metrics = state.metrics();

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Malformed vote payload: {}", rejection.body_text());
            metrics.record_rejection("validation");
            return RatingError::validation("Invalid request.").into_response();
        }
    };

    let (session_id, session) = voting_session(&state, &headers);
    let start_time = metrics.start_timer();

    let response = match state
        .gate()
        .submit(&*session, request)
        .await
    {
        Ok(VoteOutcome::Applied(_)) => {
            metrics.record_vote("applied", start_time.elapsed());
            (StatusCode::OK, "OK").into_response()
        }
        Ok(VoteOutcome::AlreadyVoted) => {
            metrics.record_vote("already_voted", start_time.elapsed());
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            match &e {
                RatingError::Validation { .. } => metrics.record_rejection("validation"),
                RatingError::Configuration { .. } => metrics.record_rejection("configuration"),
                RatingError::Storage(storage_error) => {
                    error!("Vote failed in storage: {}", storage_error);
                    metrics.record_vote("failed", start_time.elapsed());
                    metrics.record_rejection("storage");
                }
            }
            e.into_response()
        }
    };

    with_session_header(&state, &session_id, response)
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    /// Comma separated item ids
    #[serde(default)]
    pub items: String,
}

fn parse_item_ids(items: &str) -> Result<Vec<ItemId>, RatingError> {
    items
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<ItemId>()
                .map_err(|_| RatingError::validation(format!("Invalid item id '{}'.", part)))
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingsResponse {
    pub ratings: Vec<RatingView>,
}

async fn ratings_handler(
    State(state): State<Arc<AppState>>,
    Path((model_id, attribute_id)): Path<(i64, i64)>,
    Query(query): Query<ItemsQuery>,
    headers: HeaderMap,
) -> Result<Json<RatingsResponse>, RatingError> {
    let item_ids = parse_item_ids(&query.items)?;
    let (store, config) = state.gate().resolve(model_id, attribute_id)?;

    // Only an existing session can hold vote locks
    let session = supplied_session_id(&state, &headers)
        .and_then(|session_id| state.sessions().get_existing(session_id));

    let aggregates = store.get_aggregates(&item_ids).await?;
    state.metrics().aggregate_reads_total.inc();

    let mut seen = std::collections::HashSet::new();
    let ratings = item_ids
        .iter()
        .filter(|item_id| seen.insert(**item_id))
        .filter_map(|item_id| aggregates.get(item_id))
        .map(|aggregate| {
            let voted = session
                .as_ref()
                .map(|session| store.has_voted(&**session, aggregate.item_id))
                .unwrap_or(false);
            RatingView::new(store.scope(), &config, aggregate, voted)
        })
        .collect();

    debug!(
        "Served {} ratings of attribute {}/{}",
        item_ids.len(),
        model_id,
        attribute_id
    );
    Ok(Json(RatingsResponse { ratings }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    pub item_ids: Vec<ItemId>,
    pub direction: SortDirection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub item_ids: Vec<ItemId>,
}

async fn order_handler(
    State(state): State<Arc<AppState>>,
    Path((model_id, attribute_id)): Path<(i64, i64)>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, RatingError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Malformed order payload: {}", rejection.body_text());
        RatingError::validation("Invalid request.")
    })?;

    let (store, config) = state.gate().resolve(model_id, attribute_id)?;
    if !config.sortable {
        return Err(RatingError::configuration("Attribute is not sortable."));
    }

    let item_ids = store
        .order_by_rating(&request.item_ids, request.direction)
        .await?;
    state.metrics().sorts_total.inc();

    Ok(Json(OrderResponse { item_ids }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics().export() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to export metrics").into_response()
        }
    }
}
