//! Tag search and negative-prompt presets for the prompt helper.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use atelier_core::tags::NEGATIVE_PRESETS;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

/// Query parameters for GET /api/tags.
#[derive(Debug, Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

/// One tag suggestion.
#[derive(Debug, Serialize)]
pub struct TagView {
    pub name: String,
    pub category: String,
    pub post_count: u64,
}

/// One negative-prompt preset.
#[derive(Debug, Serialize)]
pub struct PresetView {
    pub name: &'static str,
    pub value: &'static str,
}

/// GET /api/tags?q=&limit=
pub async fn search_tags(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let matches: Vec<TagView> = state
        .tags
        .search(&query.q, limit)
        .into_iter()
        .map(|entry| TagView {
            name: entry.name.clone(),
            category: entry.category.clone(),
            post_count: entry.post_count,
        })
        .collect();
    Ok(Json(DataResponse { data: matches }))
}

/// GET /api/tags/negative-presets
pub async fn negative_presets() -> AppResult<impl IntoResponse> {
    let presets: Vec<PresetView> = NEGATIVE_PRESETS
        .iter()
        .map(|&(name, value)| PresetView { name, value })
        .collect();
    Ok(Json(DataResponse { data: presets }))
}
