//! High-level gateway orchestration.
//!
//! [`Gateway`] ties the REST layer and the push channel together:
//! submit a workflow, then race the push listener against an
//! authoritative polling loop over the history endpoint. The push
//! channel only ever *hints* — an event can arrive before the result
//! store is readable, so success is declared exclusively from a history
//! entry that actually contains images.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUiApi;
use crate::client::watch_for_completion;
use crate::error::GatewayError;
use crate::outputs;

/// One downloaded output image.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub file_name: String,
    pub subfolder: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Final result of a generation: the remote id, the downloaded images,
/// and the raw history entry for diagnostics.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub prompt_id: String,
    pub images: Vec<ImageArtifact>,
    pub history: Value,
}

/// Client for one ComfyUI instance: submission, completion tracking,
/// and result retrieval.
pub struct Gateway {
    api: ComfyUiApi,
    ws_url: String,
    timeout: Duration,
}

impl Gateway {
    /// Create a gateway client.
    ///
    /// * `api_base` - HTTP base URL, e.g. `http://host:8188`.
    /// * `ws_url`   - event-channel URL, e.g. `ws://host:8188/ws`.
    /// * `timeout`  - overall deadline for [`await_completion`](Self::await_completion),
    ///   also applied per HTTP request.
    pub fn new(api_base: &str, ws_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            api: ComfyUiApi::new(api_base, timeout)?,
            ws_url: ws_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Submit a rendered workflow; returns the remote prompt id.
    pub async fn submit(&self, workflow: &Value, client_id: &str) -> Result<String, GatewayError> {
        let response = self.api.submit_workflow(workflow, client_id).await?;
        tracing::info!(prompt_id = %response.prompt_id, "Workflow submitted to ComfyUI");
        Ok(response.prompt_id)
    }

    /// Wait for a submitted prompt to finish and download its images.
    ///
    /// Races two completion signals under a single overall deadline:
    ///
    /// 1. the push channel, watched for an `executed` event matching
    ///    `prompt_id` or a `progress_state` snapshot with every node
    ///    finished;
    /// 2. the history endpoint, polled with capped backoff until the
    ///    entry reports images (or a remote error).
    ///
    /// If polling resolves first its entry is used directly. If the
    /// push signal fires first, the same polling future is then awaited
    /// to completion — the event does not guarantee the result store
    /// has caught up. On every exit path the push listener is cancelled
    /// so no socket outlives the call.
    pub async fn await_completion(
        &self,
        prompt_id: &str,
        client_id: &str,
    ) -> Result<GenerationResult, GatewayError> {
        let deadline = Instant::now() + self.timeout;

        let cancel = CancellationToken::new();
        let _cancel_guard = cancel.clone().drop_guard();
        let push_handle = tokio::spawn({
            let ws_url = self.ws_url.clone();
            let client_id = client_id.to_string();
            let prompt_id = prompt_id.to_string();
            let cancel = cancel.clone();
            async move { watch_for_completion(&ws_url, &client_id, &prompt_id, &cancel).await }
        });

        let poll = self.poll_history_ready(prompt_id, deadline);
        tokio::pin!(poll);

        let entry = tokio::select! {
            result = &mut poll => result?,
            signal = push_handle => {
                match signal {
                    Ok(Some(signal)) => {
                        tracing::debug!(prompt_id, ?signal, "Push signal won the race, confirming via history");
                    }
                    Ok(None) => {
                        tracing::debug!(prompt_id, "Push channel ended without a signal, polling on");
                    }
                    Err(e) => {
                        tracing::warn!(prompt_id, error = %e, "Push listener task failed, polling on");
                    }
                }
                (&mut poll).await?
            }
        };

        self.collect_result(prompt_id, entry).await
    }

    /// Single-shot retrieval for an already-submitted prompt.
    ///
    /// In `fast` mode performs exactly one history fetch and fails with
    /// [`GatewayError::NotReady`] when no images are present yet — used
    /// by reconciliation sweeps that must not block. Otherwise uses the
    /// same retry loop as [`await_completion`](Self::await_completion).
    /// Both modes are bounded by `timeout`.
    pub async fn fetch_existing(
        &self,
        prompt_id: &str,
        fast: bool,
        timeout: Duration,
    ) -> Result<GenerationResult, GatewayError> {
        let deadline = Instant::now() + timeout;
        let fetch = async {
            let entry = if fast {
                let entry = self.api.fetch_history(prompt_id).await?;
                if !outputs::has_images(&entry) && outputs::remote_error(&entry).is_none() {
                    return Err(GatewayError::NotReady);
                }
                entry
            } else {
                self.poll_history_ready(prompt_id, deadline).await?
            };
            self.collect_result(prompt_id, entry).await
        };

        tokio::time::timeout_at(deadline, fetch)
            .await
            .map_err(|_| GatewayError::Timeout)?
    }

    /// Poll the history endpoint until the entry is ready or the
    /// deadline passes.
    ///
    /// "Ready" means the entry reports at least one image, or a remote
    /// error (which [`collect_result`](Self::collect_result) then
    /// surfaces). Transient fetch failures are swallowed and retried;
    /// the backoff is `min(500ms x attempt, 2s)`.
    async fn poll_history_ready(
        &self,
        prompt_id: &str,
        deadline: Instant,
    ) -> Result<Value, GatewayError> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.api.fetch_history(prompt_id).await {
                Ok(entry) => {
                    if outputs::has_images(&entry) || outputs::remote_error(&entry).is_some() {
                        return Ok(entry);
                    }
                    tracing::trace!(prompt_id, attempt, "History entry present but no images yet");
                }
                Err(e) => {
                    tracing::trace!(prompt_id, attempt, error = %e, "History fetch failed, retrying");
                }
            }

            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout);
            }
            tokio::time::sleep(poll_backoff(attempt)).await;
        }
    }

    /// Turn a ready history entry into a [`GenerationResult`].
    ///
    /// Surfaces remote execution errors, downloads every referenced
    /// image, and rejects outcomes that claim success with zero images.
    async fn collect_result(
        &self,
        prompt_id: &str,
        entry: Value,
    ) -> Result<GenerationResult, GatewayError> {
        if let Some(error) = outputs::remote_error(&entry) {
            return Err(GatewayError::Remote(error));
        }

        let mut images = Vec::new();
        for descriptor in outputs::image_descriptors(&entry) {
            let (mime_type, data) = self
                .api
                .fetch_image(&descriptor.filename, &descriptor.subfolder)
                .await?;
            tracing::trace!(
                prompt_id,
                file_name = %descriptor.filename,
                bytes = data.len(),
                "Downloaded output image",
            );
            images.push(ImageArtifact {
                file_name: descriptor.filename,
                subfolder: descriptor.subfolder,
                mime_type,
                data,
            });
        }

        if images.is_empty() {
            return Err(GatewayError::EmptyResult);
        }

        Ok(GenerationResult {
            prompt_id: prompt_id.to_string(),
            images,
            history: entry,
        })
    }
}

/// Backoff before the next history poll: `min(500ms x attempt, 2s)`.
fn poll_backoff(attempt: u64) -> Duration {
    Duration::from_millis((500 * attempt).min(2_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_then_caps() {
        assert_eq!(poll_backoff(1), Duration::from_millis(500));
        assert_eq!(poll_backoff(2), Duration::from_millis(1_000));
        assert_eq!(poll_backoff(3), Duration::from_millis(1_500));
        assert_eq!(poll_backoff(4), Duration::from_millis(2_000));
        assert_eq!(poll_backoff(100), Duration::from_millis(2_000));
    }

    #[test]
    fn gateway_trims_ws_url() {
        let gateway = Gateway::new(
            "http://localhost:8188",
            "ws://localhost:8188/ws/",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(gateway.ws_url, "ws://localhost:8188/ws");
    }
}
