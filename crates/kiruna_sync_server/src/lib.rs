//! Kiruna Sync Server
//!
//! Real-time synchronization of the relationship diagram layout for Kiruna
//! Explorer. Clients drag document nodes and link control points; every
//! accepted drag is persisted and the full configuration is broadcast to all
//! open connections.
//!
//! ## Features
//!
//! - **Snapshot broadcast**: every client converges on the same
//!   `update-configuration` snapshot after each change
//! - **New-joiner replay**: a fresh connection immediately receives the
//!   current configuration
//! - **Durable positions**: a single JSON document, rewritten atomically on
//!   every edit
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3001)
//! - `GRAPH_CONFIG_PATH`: Graph configuration document (default:
//!   ./graph_configuration.json)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins

pub mod config;
pub mod handlers;
pub mod sync;

pub use config::Config;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use chrono::Utc;
use handlers::{api::ApiState, api_routes, ws::WsState, ws_handler};
use sync::HubHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Build the CORS layer for the configured origins.
///
/// An empty origin list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if allowed.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(allow_origin)
}

/// Build the full router: health checks, the `/sync` WebSocket endpoint and
/// the `/api` routes.
pub fn build_router(hub: HubHandle, config: &Config) -> Router {
    let ws_state = WsState { hub: hub.clone() };
    let api_state = ApiState {
        hub,
        started_at: Utc::now(),
    };

    Router::new()
        // Health check
        .route("/", get(|| async { "Kiruna Sync Server" }))
        .route("/health", get(|| async { "OK" }))
        // WebSocket sync endpoint
        .route("/sync", get(ws_handler).with_state(ws_state))
        // API routes
        .nest("/api", api_routes(api_state))
        // Add layers
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}
