use std::sync::Arc;

use atelier_core::tags::TagDictionary;
use atelier_session::SessionEngine;

use crate::config::AppConfig;

/// Shared application state available to all axum handlers via
/// `State<AppState>`. Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide job engine (queues, history, counters).
    pub engine: Arc<SessionEngine>,
    /// Server configuration.
    pub config: Arc<AppConfig>,
    /// Tag dictionary for the prompt helper.
    pub tags: Arc<TagDictionary>,
}
