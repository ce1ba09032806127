//! Job submission and queue inspection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use atelier_core::job::{Job, JobRequest, SEED_RANDOM};
use atelier_session::CounterSnapshot;

use crate::error::{AppError, AppResult};
use crate::extract::ClientId;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for POST /api/jobs. Omitted dimensions fall back to
/// the first configured choice.
#[derive(Debug, Deserialize)]
pub struct SubmitJobBody {
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default = "default_seed")]
    pub seed: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

fn default_seed() -> i64 {
    SEED_RANDOM
}

/// Response for GET /api/jobs.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub jobs: Vec<Job>,
    pub counters: CounterSnapshot,
    pub user_running: u32,
}

/// POST /api/jobs
///
/// Queues a generation job. Dimensions must come from the configured
/// choice lists; submissions are turned away with 429 while the client
/// is already at its running limit (the admission controller would
/// only park them anyway).
pub async fn submit_job(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
    Json(body): Json<SubmitJobBody>,
) -> AppResult<impl IntoResponse> {
    let width = body.width.unwrap_or(state.config.width_list[0]);
    let height = body.height.unwrap_or(state.config.height_list[0]);

    if !state.config.width_list.contains(&width) {
        return Err(AppError::BadRequest(format!(
            "Width {width} is not one of the configured choices"
        )));
    }
    if !state.config.height_list.contains(&height) {
        return Err(AppError::BadRequest(format!(
            "Height {height} is not one of the configured choices"
        )));
    }

    let limits = state.engine.limits();
    if state.engine.user_running(&client_id) >= limits.per_user {
        return Err(AppError::CapacityExhausted(
            "Per-user concurrency limit reached; wait for the current job to finish".into(),
        ));
    }
    if limits.global_max_running > 0
        && state.engine.counters().snapshot().running >= limits.global_max_running
    {
        return Err(AppError::CapacityExhausted(
            "The system-wide concurrency limit is reached; try again shortly".into(),
        ));
    }

    let request = JobRequest {
        positive_prompt: body.positive_prompt,
        negative_prompt: body.negative_prompt,
        seed: body.seed,
        width,
        height,
    };
    let job = state.engine.submit_job(&client_id, request).await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// GET /api/jobs
///
/// Current queue contents plus counter state for this client.
pub async fn get_queue(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.engine.queue_jobs(&client_id).await;
    let resp = QueueResponse {
        jobs,
        counters: state.engine.counters().snapshot(),
        user_running: state.engine.user_running(&client_id),
    };
    Ok(Json(DataResponse { data: resp }))
}
