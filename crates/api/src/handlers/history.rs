//! History listing, image retrieval, and deletion.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use atelier_core::history::{HistoryEntry, JobOutcome};
use atelier_core::types::Timestamp;

use crate::error::{AppError, AppResult};
use crate::extract::ClientId;
use crate::response::DataResponse;
use crate::state::AppState;

/// One image inside a history entry, as metadata. The bytes are served
/// separately by [`get_image`] to keep listings small.
#[derive(Debug, Serialize)]
pub struct ImageView {
    pub index: usize,
    pub file_name: String,
    pub mime_type: String,
    pub byte_len: usize,
}

/// History entry as presented to the surface.
#[derive(Debug, Serialize)]
pub struct HistoryEntryView {
    pub job_id: String,
    pub status: &'static str,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    pub prompt_id: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
    pub images: Vec<ImageView>,
}

impl From<HistoryEntry> for HistoryEntryView {
    fn from(entry: HistoryEntry) -> Self {
        let completed_at = entry.completed_at();
        let (status, error, images) = match entry.outcome {
            JobOutcome::Running => ("running", None, Vec::new()),
            JobOutcome::Success { images, .. } => (
                "success",
                None,
                images
                    .iter()
                    .enumerate()
                    .map(|(index, image)| ImageView {
                        index,
                        file_name: image.file_name.clone(),
                        mime_type: image.mime_type.clone(),
                        byte_len: image.data.len(),
                    })
                    .collect(),
            ),
            JobOutcome::Failed { error, .. } => ("failed", Some(error), Vec::new()),
        };
        Self {
            job_id: entry.job_id,
            status,
            positive_prompt: entry.positive_prompt,
            negative_prompt: entry.negative_prompt,
            seed: entry.seed,
            width: entry.width,
            height: entry.height,
            prompt_id: entry.prompt_id,
            completed_at,
            error,
            images,
        }
    }
}

/// GET /api/history
///
/// All history entries for this client, newest first.
pub async fn list_history(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let views: Vec<HistoryEntryView> = state
        .engine
        .history_entries(&client_id)
        .await
        .into_iter()
        .rev()
        .map(HistoryEntryView::from)
        .collect();
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/history/{job_id}/images/{index}
///
/// Raw bytes of one stored image, with its content type.
pub async fn get_image(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
    Path((job_id, index)): Path<(String, usize)>,
) -> AppResult<impl IntoResponse> {
    let image = state
        .engine
        .image(&client_id, &job_id, index)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No image {index} for job {job_id}")))?;

    Ok(([(header::CONTENT_TYPE, image.mime_type)], image.data))
}

/// DELETE /api/history/{job_id}
pub async fn delete_entry(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !state.engine.delete_history_entry(&client_id, &job_id).await {
        return Err(AppError::NotFound(format!("No history entry for job {job_id}")));
    }
    Ok(Json(DataResponse { data: () }))
}

/// DELETE /api/history
pub async fn clear_history(
    ClientId(client_id): ClientId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    state.engine.clear_history(&client_id).await;
    Ok(Json(DataResponse { data: () }))
}
