//! Deployment status for the surface's sidebar.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use atelier_session::CounterSnapshot;

use crate::error::AppResult;
use crate::extract::ClientId;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for GET /api/status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counters: CounterSnapshot,
    pub user_running: u32,
    pub per_user_limit: u32,
    /// 0 means the global cap is disabled.
    pub global_max_running: u32,
    pub width_choices: Vec<u32>,
    pub height_choices: Vec<u32>,
    pub workflow_path: String,
    pub log_level: String,
}

/// GET /api/status
pub async fn get_status(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let limits = state.engine.limits();
    let resp = StatusResponse {
        counters: state.engine.counters().snapshot(),
        user_running: state.engine.user_running(&client_id),
        per_user_limit: limits.per_user,
        global_max_running: limits.global_max_running,
        width_choices: state.config.width_list.clone(),
        height_choices: state.config.height_list.clone(),
        workflow_path: state.config.workflow_path.display().to_string(),
        log_level: state.config.log_level.clone(),
    };
    Ok(Json(DataResponse { data: resp }))
}
