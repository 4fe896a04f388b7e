use crate::sync::{HubError, HubHandle};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use kiruna_core::{ElementType, KnownElements, build_snapshot, error::SerializableError};
use serde::Serialize;
use tracing::error;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub hub: HubHandle,
    pub started_at: DateTime<Utc>,
}

/// Server status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub active_connections: usize,
    pub updates_applied: u64,
    pub started_at: DateTime<Utc>,
}

/// Response for element removal
#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

/// Response for orphan pruning
#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub removed: usize,
}

/// Create API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/graph", get(get_graph))
        .route("/graph/reset", post(reset_graph))
        .route("/graph/prune", post(prune_graph))
        .route("/graph/{element_type}/{id}", delete(remove_element))
        .with_state(state)
}

fn hub_error_response(err: HubError) -> Response {
    match err {
        HubError::Closed => {
            error!("Sync hub is not running");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        HubError::Store(e) => {
            error!("Graph configuration store failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SerializableError::from(&e)),
            )
                .into_response()
        }
    }
}

/// GET /api/status - Get server status
async fn get_status(State(state): State<ApiState>) -> Response {
    let stats = match state.hub.stats().await {
        Ok(stats) => stats,
        Err(e) => return hub_error_response(e),
    };

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: stats.active_connections,
        updates_applied: stats.updates_applied,
        started_at: state.started_at,
    })
    .into_response()
}

/// GET /api/graph - Current configuration, in the same envelope as broadcasts
async fn get_graph(State(state): State<ApiState>) -> Response {
    match state.hub.snapshot().await {
        Ok(config) => Json(build_snapshot(config)).into_response(),
        Err(e) => hub_error_response(e),
    }
}

/// DELETE /api/graph/{element_type}/{id} - Forget the position of a deleted
/// document or link
async fn remove_element(
    State(state): State<ApiState>,
    Path((element_type, id)): Path<(String, String)>,
) -> Response {
    let element_type = match element_type.parse::<ElementType>() {
        Ok(element_type) => element_type,
        Err(e) => {
            return (StatusCode::NOT_FOUND, Json(SerializableError::from(&e))).into_response();
        }
    };

    match state.hub.remove_element(element_type, id.into()).await {
        Ok(removed) => Json(RemoveResponse { removed }).into_response(),
        Err(e) => hub_error_response(e),
    }
}

/// POST /api/graph/reset - Clear every position
async fn reset_graph(State(state): State<ApiState>) -> Response {
    match state.hub.reset().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => hub_error_response(e),
    }
}

/// POST /api/graph/prune - Drop positions of elements missing from the
/// posted catalog
async fn prune_graph(
    State(state): State<ApiState>,
    Json(catalog): Json<KnownElements>,
) -> Response {
    match state.hub.prune(catalog).await {
        Ok(removed) => Json(PruneResponse { removed }).into_response(),
        Err(e) => hub_error_response(e),
    }
}
