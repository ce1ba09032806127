//! WebSocket push-channel client.
//!
//! Opens the ComfyUI event connection scoped to a client id and watches
//! it for a completion signal for one specific prompt. The watcher is a
//! best-effort hint: any connection problem makes it bow out quietly and
//! the caller falls back to polling the history endpoint.

use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::messages::{parse_message, PushMessage};

/// Timeout for establishing the WebSocket connection.
const WS_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// A live push-channel stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Completion signal observed on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSignal {
    /// An `executed` event matched the prompt id.
    Executed,
    /// A `progress_state` snapshot showed every node finished.
    AllNodesFinished,
}

/// Build the event-channel URL for a client id.
///
/// Appends `clientId={client_id}` unless the configured URL already
/// carries one, choosing `?` or `&` as appropriate.
pub fn build_ws_url(ws_url: &str, client_id: &str) -> String {
    let base = ws_url.trim_end_matches('/');
    if base.contains("clientId=") {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}clientId={client_id}")
}

/// Connect to the ComfyUI push channel.
pub async fn connect(ws_url: &str, client_id: &str) -> Result<WsStream, GatewayError> {
    let url = build_ws_url(ws_url, client_id);
    let (stream, _response) = tokio::time::timeout(WS_OPEN_TIMEOUT, connect_async(&url))
        .await
        .map_err(|_| GatewayError::Connection("Timed out opening the event channel".into()))?
        .map_err(|e| GatewayError::Connection(format!("Failed to connect to ComfyUI: {e}")))?;

    tracing::debug!(client_id, "Connected to ComfyUI event channel");
    Ok(stream)
}

/// Watch the push channel until a completion signal for `prompt_id`
/// arrives, the socket closes, or `cancel` is triggered.
///
/// Returns `None` when no signal was observed — including every failure
/// mode. The caller must treat a signal as a hint only and confirm via
/// the history endpoint.
pub async fn watch_for_completion(
    ws_url: &str,
    client_id: &str,
    prompt_id: &str,
    cancel: &CancellationToken,
) -> Option<PushSignal> {
    let mut stream = match connect(ws_url, client_id).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(prompt_id, error = %e, "Push channel unavailable, relying on polling");
            return None;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = stream.close(None).await;
                tracing::trace!(prompt_id, "Push listener cancelled");
                return None;
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return None;
                };
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(signal) = inspect_frame(&text, prompt_id) {
                            let _ = stream.close(None).await;
                            return Some(signal);
                        }
                    }
                    // Binary frames carry preview images; pings and
                    // pongs are handled by tungstenite.
                    Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(prompt_id, ?frame, "Push channel closed by server");
                        return None;
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        tracing::warn!(prompt_id, error = %e, "Push channel receive error");
                        return None;
                    }
                }
            }
        }
    }
}

/// Inspect one text frame for a completion signal.
fn inspect_frame(text: &str, prompt_id: &str) -> Option<PushSignal> {
    match parse_message(text) {
        Ok(PushMessage::Executed(data)) if data.prompt_id == prompt_id => {
            tracing::debug!(prompt_id, "Push channel reported execution completed");
            Some(PushSignal::Executed)
        }
        Ok(PushMessage::ProgressState(data)) if data.all_nodes_finished() => {
            tracing::debug!(prompt_id, "Push channel reported all nodes finished");
            Some(PushSignal::AllNodesFinished)
        }
        Ok(PushMessage::ExecutionError(data)) if data.prompt_id == prompt_id => {
            // The history entry is authoritative for errors too; keep
            // listening in case a later snapshot still completes.
            tracing::warn!(
                prompt_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Push channel reported an execution error",
            );
            None
        }
        Ok(_) => None,
        Err(_) => {
            // Non-JSON frames and unknown message types are expected
            // (custom nodes broadcast their own events).
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_client_id_with_question_mark() {
        assert_eq!(
            build_ws_url("ws://localhost:8188/ws", "abc"),
            "ws://localhost:8188/ws?clientId=abc"
        );
    }

    #[test]
    fn appends_client_id_with_ampersand_when_query_present() {
        assert_eq!(
            build_ws_url("ws://localhost:8188/ws?token=x", "abc"),
            "ws://localhost:8188/ws?token=x&clientId=abc"
        );
    }

    #[test]
    fn existing_client_id_is_left_alone() {
        assert_eq!(
            build_ws_url("ws://localhost:8188/ws?clientId=fixed", "abc"),
            "ws://localhost:8188/ws?clientId=fixed"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(
            build_ws_url("ws://localhost:8188/ws/", "abc"),
            "ws://localhost:8188/ws?clientId=abc"
        );
    }

    #[test]
    fn executed_frame_for_matching_prompt_signals() {
        let text = r#"{"type":"executed","data":{"node":"9","prompt_id":"abc"}}"#;
        assert_eq!(inspect_frame(text, "abc"), Some(PushSignal::Executed));
    }

    #[test]
    fn executed_frame_for_other_prompt_is_ignored() {
        let text = r#"{"type":"executed","data":{"node":"9","prompt_id":"other"}}"#;
        assert_eq!(inspect_frame(text, "abc"), None);
    }

    #[test]
    fn finished_progress_state_signals() {
        let text = r#"{"type":"progress_state","data":{"nodes":{"1":{"state":"finished"}}}}"#;
        assert_eq!(inspect_frame(text, "abc"), Some(PushSignal::AllNodesFinished));
    }

    #[test]
    fn unknown_frames_are_skipped() {
        assert_eq!(inspect_frame("not json", "abc"), None);
        assert_eq!(inspect_frame(r#"{"type":"crystools.monitor","data":{}}"#, "abc"), None);
    }
}
