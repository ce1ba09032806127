//! Restart reconciliation.
//!
//! When a session comes back after a process restart or reload, its
//! history may contain entries still marked running: the old process
//! died somewhere between admission and completion. This sweep resolves
//! each of them against the gateway's authoritative result store — and
//! runs exactly once per session per process lifecycle, so settled
//! state is never re-queried on every interaction.

use std::sync::atomic::Ordering;

use atelier_comfyui::GatewayError;
use atelier_core::history::JobOutcome;
use atelier_core::job::JobStatus;
use atelier_core::types::now;

use crate::engine::{SessionEngine, UserSession};

impl SessionEngine {
    /// Reconcile running history entries against gateway state.
    ///
    /// Per entry:
    /// - no remote prompt id recorded: the process died before the
    ///   gateway accepted the job; nothing can ever complete it, so the
    ///   entry is discarded and its running slot released;
    /// - fast fetch succeeds: the job finished while nobody watched;
    ///   the entry becomes `Success` and the slot is released;
    /// - fast fetch says not-ready: the job may still be executing;
    ///   the entry and its slot are left alone for a later sweep;
    /// - anything else: the entry becomes `Failed` (redacted message)
    ///   and the slot is released.
    pub(crate) async fn reconcile(&self, session: &UserSession) {
        if session.reconciled.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = {
            let history = session.history.lock().await;
            history.running_entries()
        };
        if running.is_empty() {
            return;
        }
        tracing::info!(
            client_id = %session.client_id,
            count = running.len(),
            "Reconciling running history entries",
        );

        for entry in running {
            let Some(prompt_id) = entry.prompt_id.clone() else {
                {
                    let mut history = session.history.lock().await;
                    history.remove(&entry.job_id);
                }
                self.counters.release(&session.client_id, JobStatus::Running);
                tracing::warn!(
                    client_id = %session.client_id,
                    job_id = %entry.job_id,
                    "Discarded running entry that never reached the gateway",
                );
                continue;
            };

            match self
                .backend
                .fetch_existing(&prompt_id, true, self.config.reconcile_timeout)
                .await
            {
                Ok(result) => {
                    let images = result
                        .images
                        .into_iter()
                        .map(|artifact| atelier_core::history::StoredImage {
                            file_name: artifact.file_name,
                            mime_type: artifact.mime_type,
                            data: artifact.data,
                        })
                        .collect();
                    {
                        let mut history = session.history.lock().await;
                        history.upsert(entry.clone().with_outcome(JobOutcome::Success {
                            images,
                            completed_at: now(),
                        }));
                    }
                    self.counters.release(&session.client_id, JobStatus::Running);
                    tracing::info!(
                        client_id = %session.client_id,
                        job_id = %entry.job_id,
                        prompt_id = %prompt_id,
                        "Recovered finished generation",
                    );
                }
                Err(GatewayError::NotReady) => {
                    // Still executing remotely; keep the slot reserved.
                    tracing::debug!(
                        client_id = %session.client_id,
                        job_id = %entry.job_id,
                        prompt_id = %prompt_id,
                        "Result not ready yet, leaving entry running",
                    );
                }
                Err(e) => {
                    let message = self.redactor.redact(&e.to_string());
                    {
                        let mut history = session.history.lock().await;
                        history.upsert(entry.clone().with_outcome(JobOutcome::Failed {
                            error: format!("Failed to recover result: {message}"),
                            completed_at: now(),
                        }));
                    }
                    self.counters.release(&session.client_id, JobStatus::Running);
                    tracing::warn!(
                        client_id = %session.client_id,
                        job_id = %entry.job_id,
                        prompt_id = %prompt_id,
                        error = %message,
                        "Reconciliation marked entry failed",
                    );
                }
            }
        }

        self.persist(session).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use atelier_core::history::JobOutcome;
    use atelier_storage::{MemoryStore, SnapshotStore};

    use crate::counters::{CounterSnapshot, Limits};
    use crate::engine::tests::{engine_with, FetchOutcome, StubBackend};
    use crate::engine::KEY_HISTORY;

    fn running_entry(job_id: &str, prompt_id: Option<&str>) -> serde_json::Value {
        json!({
            "job_id": job_id,
            "positive_prompt": "a",
            "negative_prompt": "",
            "seed": 1,
            "width": 512,
            "height": 512,
            "prompt_id": prompt_id,
            "status": "running"
        })
    }

    async fn store_with_history(entries: serde_json::Value) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.save("alice", KEY_HISTORY, &entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn entry_without_prompt_id_is_discarded_and_slot_restored() {
        let backend = StubBackend::new();
        let store = store_with_history(json!([running_entry("j1", None)])).await;
        let engine = engine_with(backend, Arc::clone(&store), Limits::default());

        let entries = engine.history_entries("alice").await;
        assert!(entries.is_empty());
        assert_eq!(
            engine.counters().snapshot(),
            CounterSnapshot { queued: 0, running: 0 }
        );
        assert_eq!(engine.user_running("alice"), 0);

        // The discard is persisted.
        let snapshot = store.load("alice", KEY_HISTORY).await.unwrap().unwrap();
        assert_eq!(snapshot, json!([]));
    }

    #[tokio::test]
    async fn not_ready_entry_keeps_running_and_its_slot() {
        let backend = StubBackend::new();
        backend.script_fetch("p1", FetchOutcome::NotReady);
        let store = store_with_history(json!([running_entry("j1", Some("p1"))])).await;
        let engine = engine_with(backend, store, Limits::default());

        let entries = engine.history_entries("alice").await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_running());
        assert_eq!(engine.counters().snapshot().running, 1);
        assert_eq!(engine.user_running("alice"), 1);
    }

    #[tokio::test]
    async fn ready_entry_is_recovered_as_success() {
        let backend = StubBackend::new();
        backend.script_fetch("p1", FetchOutcome::Ready);
        let store = store_with_history(json!([running_entry("j1", Some("p1"))])).await;
        let engine = engine_with(backend, store, Limits::default());

        let entries = engine.history_entries("alice").await;
        assert_eq!(entries.len(), 1);
        match &entries[0].outcome {
            JobOutcome::Success { images, .. } => assert_eq!(images.len(), 1),
            other => panic!("Expected Success, got {other:?}"),
        }
        assert_eq!(entries[0].prompt_id.as_deref(), Some("p1"));
        assert_eq!(engine.counters().snapshot().running, 0);
    }

    #[tokio::test]
    async fn failed_fetch_marks_entry_failed_with_redacted_error() {
        let backend = StubBackend::new();
        backend.script_fetch("p1", FetchOutcome::Fail);
        let store = store_with_history(json!([running_entry("j1", Some("p1"))])).await;
        let engine = engine_with(backend, store, Limits::default());

        let entries = engine.history_entries("alice").await;
        assert_eq!(entries.len(), 1);
        match &entries[0].outcome {
            JobOutcome::Failed { error, .. } => {
                assert!(error.contains("Failed to recover result"), "error: {error}");
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
        assert_eq!(engine.counters().snapshot().running, 0);
    }

    #[tokio::test]
    async fn sweep_runs_once_per_process_lifecycle() {
        let backend = StubBackend::new();
        backend.script_fetch("p1", FetchOutcome::NotReady);
        let store = store_with_history(json!([running_entry("j1", Some("p1"))])).await;
        let engine = engine_with(Arc::clone(&backend), store, Limits::default());

        assert!(engine.history_entries("alice").await[0].is_running());

        // Even though the result is now ready, a later interaction must
        // not re-run the sweep in this process lifecycle.
        backend.script_fetch("p1", FetchOutcome::Ready);
        assert!(engine.history_entries("alice").await[0].is_running());
        assert_eq!(engine.counters().snapshot().running, 1);
    }

    #[tokio::test]
    async fn mixed_entries_are_each_resolved_independently() {
        let backend = StubBackend::new();
        backend.script_fetch("done", FetchOutcome::Ready);
        backend.script_fetch("pending", FetchOutcome::NotReady);
        let store = store_with_history(json!([
            running_entry("j-done", Some("done")),
            running_entry("j-pending", Some("pending")),
            running_entry("j-lost", None),
        ]))
        .await;
        let engine = engine_with(backend, store, Limits::default());

        let entries = engine.history_entries("alice").await;
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            entries.iter().find(|e| e.job_id == "j-done").unwrap().outcome,
            JobOutcome::Success { .. }
        ));
        assert!(entries.iter().find(|e| e.job_id == "j-pending").unwrap().is_running());
        // Only the pending entry still holds a slot.
        assert_eq!(engine.counters().snapshot().running, 1);
    }
}
