//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the
//! kinds the client cares about into a strongly-typed [`PushMessage`]
//! enum.

use std::collections::HashMap;

use serde::Deserialize;

/// Known ComfyUI WebSocket message types.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content. Unknown types fail to parse; the
/// listener logs and skips them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PushMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node has finished and produced output. Carries the prompt id
    /// the output belongs to; the final node's message doubles as a
    /// completion signal.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Per-node execution state snapshot. All nodes `finished` is the
    /// second completion signal.
    #[serde(rename = "progress_state")]
    ProgressState(ProgressStateData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub prompt_id: String,
    /// The node that produced the output, when reported.
    #[serde(default)]
    pub node: Option<String>,
}

/// Payload for `progress_state` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressStateData {
    #[serde(default)]
    pub nodes: HashMap<String, NodeProgress>,
}

/// Per-node execution state inside a `progress_state` snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeProgress {
    #[serde(default)]
    pub state: String,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

impl ProgressStateData {
    /// Whether every reported node has reached the `finished` state.
    ///
    /// An empty snapshot is not "finished" — it carries no information.
    pub fn all_nodes_finished(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.values().all(|node| node.state == "finished")
    }
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<PushMessage, serde_json::Error> {
    serde_json::from_str(text)
}
