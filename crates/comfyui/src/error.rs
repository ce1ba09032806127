//! Error taxonomy for the gateway client.

/// Errors from the ComfyUI gateway layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// ComfyUI rejected the submitted workflow (non-2xx from `/prompt`).
    /// The response body is preserved for diagnostics.
    #[error("ComfyUI rejected the workflow ({status}): {body}")]
    Submission { status: u16, body: String },

    /// The submission response did not carry a `prompt_id`.
    #[error("ComfyUI response did not include a prompt_id")]
    MissingPromptId,

    /// Neither the push channel nor the history endpoint produced a
    /// ready result before the deadline.
    #[error("Timed out waiting for ComfyUI to report a result")]
    Timeout,

    /// The remote history entry reports an execution error.
    #[error("ComfyUI reported execution errors: {0}")]
    Remote(String),

    /// The history entry exists but carries no images yet. Transient;
    /// only surfaced by fast-mode fetches used during reconciliation.
    #[error("ComfyUI history is not ready (no images yet)")]
    NotReady,

    /// Execution finished without producing a single image.
    #[error("ComfyUI history had no images in outputs")]
    EmptyResult,

    /// The HTTP request itself failed (network, DNS, TLS, non-2xx).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Failed to establish the WebSocket push channel.
    #[error("Connection error: {0}")]
    Connection(String),
}
