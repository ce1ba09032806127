//! Route table and middleware stack.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::extract::CLIENT_ID_HEADER;
use crate::handlers::{history, jobs, status, tags};
use crate::state::AppState;

/// HTTP request timeout. Submission only enqueues (generation runs in
/// spawned tasks), so no handler needs the gateway's long deadline.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .route("/api/jobs", post(jobs::submit_job).get(jobs::get_queue))
        .route(
            "/api/history",
            get(history::list_history).delete(history::clear_history),
        )
        .route("/api/history/{job_id}", delete(history::delete_entry))
        .route("/api/history/{job_id}/images/{index}", get(history::get_image))
        .route("/api/status", get(status::get_status))
        .route("/api/tags", get(tags::search_tags))
        .route("/api/tags/negative-presets", get(tags::negative_presets))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(HANDLER_TIMEOUT))
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(CLIENT_ID_HEADER)])
}
