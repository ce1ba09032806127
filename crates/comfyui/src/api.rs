//! REST client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history retrieval, and image download
//! using [`reqwest`]. Higher-level orchestration (the push/poll race)
//! lives in [`crate::gateway`].

use std::time::Duration;

use serde_json::Value;

use crate::error::GatewayError;
use crate::outputs;

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUiApi {
    client: reqwest::Client,
    api_base: String,
}

/// Response returned by `/prompt` after successfully queuing a workflow.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
}

impl ComfyUiApi {
    /// Create an API client.
    ///
    /// * `api_base` - Base HTTP URL, e.g. `http://host:8188`. A trailing
    ///   slash is tolerated and trimmed.
    /// * `timeout` - Per-request timeout applied to every call.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Base HTTP API URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the rendered workflow JSON and the
    /// caller's client id. A non-2xx status surfaces the response body
    /// for diagnostics; a 2xx response without a `prompt_id` is also an
    /// error.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, GatewayError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_base))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await?;
        let prompt_id = data
            .get("prompt_id")
            .and_then(Value::as_str)
            .ok_or(GatewayError::MissingPromptId)?;

        Ok(SubmitResponse {
            prompt_id: prompt_id.to_string(),
        })
    }

    /// Retrieve the history entry for a specific prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. ComfyUI sometimes nests the
    /// entry under a `history` key and sometimes returns a flat object
    /// keyed by prompt id; both shapes are handled. A response without
    /// the entry means the result store has not caught up yet.
    pub async fn fetch_history(&self, prompt_id: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_base, prompt_id))
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        outputs::extract_entry(&data, prompt_id).ok_or(GatewayError::NotReady)
    }

    /// Download one output image as raw bytes.
    ///
    /// Sends `GET /view?filename=&subfolder=&type=output`. Returns the
    /// content type alongside the bytes.
    pub async fn fetch_image(
        &self,
        file_name: &str,
        subfolder: &str,
    ) -> Result<(String, Vec<u8>), GatewayError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_base))
            .query(&[
                ("filename", file_name),
                ("subfolder", subfolder),
                ("type", "output"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok((mime_type, bytes))
    }
}
