//! The seam between the session engine and the generation gateway.
//!
//! The engine drives jobs through this trait rather than the concrete
//! ComfyUI client, so reconciliation and admission logic can be tested
//! against scripted backends.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use atelier_comfyui::{Gateway, GatewayError, GenerationResult};

/// Remote generation system, reduced to the three calls the engine
/// needs.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit a rendered workflow; returns the remote job id.
    async fn submit(&self, workflow: &Value, client_id: &str) -> Result<String, GatewayError>;

    /// Wait for a submitted job to finish and download its images.
    async fn await_completion(
        &self,
        prompt_id: &str,
        client_id: &str,
    ) -> Result<GenerationResult, GatewayError>;

    /// Single-shot retrieval for reconciliation. `fast` performs one
    /// history fetch and fails with [`GatewayError::NotReady`] when the
    /// result is not yet readable.
    async fn fetch_existing(
        &self,
        prompt_id: &str,
        fast: bool,
        timeout: Duration,
    ) -> Result<GenerationResult, GatewayError>;
}

#[async_trait]
impl GenerationBackend for Gateway {
    async fn submit(&self, workflow: &Value, client_id: &str) -> Result<String, GatewayError> {
        Gateway::submit(self, workflow, client_id).await
    }

    async fn await_completion(
        &self,
        prompt_id: &str,
        client_id: &str,
    ) -> Result<GenerationResult, GatewayError> {
        Gateway::await_completion(self, prompt_id, client_id).await
    }

    async fn fetch_existing(
        &self,
        prompt_id: &str,
        fast: bool,
        timeout: Duration,
    ) -> Result<GenerationResult, GatewayError> {
        Gateway::fetch_existing(self, prompt_id, fast, timeout).await
    }
}
