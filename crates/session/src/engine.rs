//! The session engine: admission, job driving, and per-client state.
//!
//! One [`SessionEngine`] spans the whole server process. It owns the
//! shared slot counters, the per-client sessions (queue + history),
//! the workflow template, and the gateway backend. A submission flows
//! through it as: validate -> enqueue -> admit under the concurrency
//! caps -> render the workflow -> submit to the gateway -> await the
//! completion race -> record the outcome and release the slots.
//!
//! Counter locks are never held across awaits; the queue and history
//! mutexes guard only in-memory mutation, with snapshots cloned out
//! before any I/O.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use atelier_comfyui::{GatewayError, GenerationResult, ImageArtifact};
use atelier_core::error::CoreError;
use atelier_core::history::{HistoryEntry, JobOutcome, StoredImage};
use atelier_core::job::{validate_request, Job, JobRequest, JobStatus};
use atelier_core::redact::Redactor;
use atelier_core::types::now;
use atelier_core::workflow::{render_workflow, TemplateError, WorkflowInputs};
use atelier_storage::SnapshotStore;

use crate::backend::GenerationBackend;
use crate::counters::{Limits, SlotCounters};
use crate::history::HistoryStore;
use crate::queue::JobQueue;

/// Snapshot key for the job queue.
pub const KEY_JOBS: &str = "jobs";
/// Snapshot key for the history store.
pub const KEY_HISTORY: &str = "history";

/// Engine tunables, typically derived from the environment config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub limits: Limits,
    /// Deadline for the fast history fetch during reconciliation.
    pub reconcile_timeout: Duration,
    /// Retention window for terminal history entries; zero keeps them
    /// forever.
    pub history_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            reconcile_timeout: Duration::from_millis(1_500),
            history_ttl: Duration::ZERO,
        }
    }
}

/// Per-client state: the live queue, the history store, and the
/// one-shot reconciliation flag for this process lifecycle.
pub struct UserSession {
    pub(crate) client_id: String,
    pub(crate) queue: Mutex<JobQueue>,
    pub(crate) history: Mutex<HistoryStore>,
    pub(crate) reconciled: AtomicBool,
}

impl UserSession {
    fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            queue: Mutex::new(JobQueue::default()),
            history: Mutex::new(HistoryStore::default()),
            reconciled: AtomicBool::new(false),
        }
    }
}

/// Process-wide job engine. Cheap to share via `Arc`.
pub struct SessionEngine {
    pub(crate) backend: Arc<dyn GenerationBackend>,
    pub(crate) store: Arc<dyn SnapshotStore>,
    pub(crate) template: Value,
    pub(crate) redactor: Redactor,
    pub(crate) config: EngineConfig,
    pub(crate) counters: Arc<SlotCounters>,
    sessions: RwLock<HashMap<String, Arc<UserSession>>>,
}

/// Everything that can sink a driven job. Both variants end up as a
/// redacted `Failed` history entry, never a crash.
#[derive(Debug, thiserror::Error)]
enum DriveError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionEngine {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn SnapshotStore>,
        template: Value,
        redactor: Redactor,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            store,
            template,
            redactor,
            config,
            counters: Arc::new(SlotCounters::default()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn counters(&self) -> &SlotCounters {
        &self.counters
    }

    pub fn limits(&self) -> Limits {
        self.config.limits
    }

    /// Running count for one client (drives the surface's submit gate).
    pub fn user_running(&self, client_id: &str) -> u32 {
        self.counters.user_running(client_id)
    }

    /// Validate, enqueue, and try to admit a new job.
    pub async fn submit_job(
        self: &Arc<Self>,
        client_id: &str,
        request: JobRequest,
    ) -> Result<Job, CoreError> {
        validate_request(&request)?;
        let session = self.session(client_id).await;

        let job = Job::from_request(&request);
        {
            let mut queue = session.queue.lock().await;
            queue.add(job.clone());
        }
        self.counters.note_queued();
        tracing::info!(
            client_id,
            job_id = %job.id,
            seed = job.seed,
            width = job.width,
            height = job.height,
            "Job queued",
        );

        self.persist(&session).await;
        self.pump(&session).await;
        Ok(job)
    }

    /// Current queue contents for a client, in submission order.
    pub async fn queue_jobs(self: &Arc<Self>, client_id: &str) -> Vec<Job> {
        let session = self.session(client_id).await;
        let queue = session.queue.lock().await;
        queue.jobs().to_vec()
    }

    /// History entries for a client, in insertion order.
    pub async fn history_entries(self: &Arc<Self>, client_id: &str) -> Vec<HistoryEntry> {
        let session = self.session(client_id).await;
        let history = session.history.lock().await;
        history.entries().to_vec()
    }

    /// One stored image out of a successful history entry.
    pub async fn image(
        self: &Arc<Self>,
        client_id: &str,
        job_id: &str,
        index: usize,
    ) -> Option<StoredImage> {
        let session = self.session(client_id).await;
        let history = session.history.lock().await;
        match &history.get(job_id)?.outcome {
            JobOutcome::Success { images, .. } => images.get(index).cloned(),
            _ => None,
        }
    }

    /// Delete one history entry (and any live queue record for the same
    /// job), releasing whatever slots it still held.
    pub async fn delete_history_entry(self: &Arc<Self>, client_id: &str, job_id: &str) -> bool {
        let session = self.session(client_id).await;

        let removed_job = {
            let mut queue = session.queue.lock().await;
            queue.remove(job_id)
        };
        if let Some(job) = &removed_job {
            self.counters.release(&session.client_id, job.status);
        }

        let removed_entry = {
            let mut history = session.history.lock().await;
            history.remove(job_id)
        };
        // A running entry with no live queue job holds a slot that no
        // driver will ever give back (restored from a snapshot); free
        // it here.
        if removed_job.is_none() {
            if let Some(entry) = &removed_entry {
                if entry.is_running() {
                    self.counters.release(&session.client_id, JobStatus::Running);
                }
            }
        }

        let removed = removed_job.is_some() || removed_entry.is_some();
        if removed {
            tracing::info!(client_id, job_id, "History entry deleted");
            self.persist(&session).await;
        }
        removed
    }

    /// Drop a client's entire history.
    pub async fn clear_history(self: &Arc<Self>, client_id: &str) {
        let session = self.session(client_id).await;
        {
            let queue = session.queue.lock().await;
            let mut history = session.history.lock().await;
            for entry in history.running_entries() {
                if queue.get(&entry.job_id).is_none() {
                    self.counters.release(&session.client_id, JobStatus::Running);
                }
            }
            history.clear();
        }
        tracing::info!(client_id, "History cleared");
        self.persist(&session).await;
    }

    // ---- session lifecycle ----

    /// Get or lazily create the session for a client.
    ///
    /// First touch restores the queue/history snapshots, then runs the
    /// reconciliation sweep (guarded to once per process lifecycle per
    /// client) and pumps the queue in case restored jobs are
    /// admissible.
    pub(crate) async fn session(self: &Arc<Self>, client_id: &str) -> Arc<UserSession> {
        if let Some(session) = self.sessions.read().await.get(client_id).cloned() {
            self.reconcile(&session).await;
            self.pump(&session).await;
            return session;
        }

        let session = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(client_id).cloned() {
                Some(existing) => existing,
                None => {
                    let session = Arc::new(UserSession::new(client_id));
                    // Restore while still holding the write lock so no
                    // request ever sees a half-initialized session.
                    self.restore(&session).await;
                    sessions.insert(client_id.to_string(), Arc::clone(&session));
                    session
                }
            }
        };

        self.reconcile(&session).await;
        self.pump(&session).await;
        session
    }

    /// Load queue and history snapshots and re-seed the counters.
    async fn restore(&self, session: &UserSession) {
        match self.store.load(&session.client_id, KEY_JOBS).await {
            Ok(Some(value)) => match serde_json::from_value::<Vec<Job>>(value) {
                Ok(jobs) => {
                    // A job marked running lost its driver with the old
                    // process; its history entry decides its fate during
                    // reconciliation. Only queued jobs survive restore.
                    let restored: Vec<Job> = jobs
                        .into_iter()
                        .filter(|job| job.status == JobStatus::Queued)
                        .collect();
                    for _ in &restored {
                        self.counters.note_queued();
                    }
                    if !restored.is_empty() {
                        tracing::info!(
                            client_id = %session.client_id,
                            count = restored.len(),
                            "Restored queued jobs from snapshot",
                        );
                    }
                    session.queue.lock().await.replace_all(restored);
                }
                Err(e) => {
                    tracing::warn!(client_id = %session.client_id, error = %e, "Discarding unreadable jobs snapshot");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(client_id = %session.client_id, error = %e, "Failed to load jobs snapshot");
            }
        }

        match self.store.load(&session.client_id, KEY_HISTORY).await {
            Ok(Some(value)) => match serde_json::from_value::<Vec<HistoryEntry>>(value) {
                Ok(entries) => {
                    let mut history = session.history.lock().await;
                    history.replace_all(entries);
                    let pruned = history.prune_expired(self.config.history_ttl, now());
                    if pruned > 0 {
                        tracing::debug!(
                            client_id = %session.client_id,
                            pruned,
                            "Expired history entries pruned",
                        );
                    }
                    // Entries still marked running held a slot when the
                    // old process died; re-register them so the sweep's
                    // releases stay symmetric.
                    for _ in history.running_entries() {
                        self.counters.seed_running(&session.client_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(client_id = %session.client_id, error = %e, "Discarding unreadable history snapshot");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(client_id = %session.client_id, error = %e, "Failed to load history snapshot");
            }
        }
    }

    // ---- admission & driving ----

    /// Admit queued jobs while capacity allows, first-in-first-out.
    ///
    /// The capacity check and counter increments are one atomic
    /// decision inside [`SlotCounters::try_admit`]; this loop stops at
    /// the first job the counters refuse.
    pub(crate) async fn pump(self: &Arc<Self>, session: &Arc<UserSession>) {
        loop {
            let admitted = {
                let mut queue = session.queue.lock().await;
                let Some(candidate_id) = queue.next_queued().map(|job| job.id.clone()) else {
                    break;
                };
                if !self.counters.try_admit(&session.client_id, &self.config.limits) {
                    break;
                }
                queue.update(&candidate_id, |job| job.status = JobStatus::Running);
                queue.get(&candidate_id).cloned()
            };
            let Some(job) = admitted else {
                // Candidate disappeared under the lock; return its slot.
                self.counters.release(&session.client_id, JobStatus::Running);
                break;
            };

            {
                let mut history = session.history.lock().await;
                history.upsert(HistoryEntry::running(&job));
            }
            tracing::info!(
                client_id = %session.client_id,
                job_id = %job.id,
                "Job admitted to running",
            );
            self.persist(session).await;

            let engine = Arc::clone(self);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                engine.drive_job(session, job).await;
            });
        }
    }

    /// Drive one admitted job to a terminal outcome.
    ///
    /// Whatever happens inside the gateway, the tail of this function
    /// always records an outcome, removes the job from the queue,
    /// releases its slots, and pumps the queue again — a failed
    /// generation never takes a slot with it.
    fn drive_job(
        self: Arc<Self>,
        session: Arc<UserSession>,
        job: Job,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        let outcome = match self.run_generation(&session, &job).await {
            Ok(result) => {
                tracing::info!(
                    client_id = %session.client_id,
                    job_id = %job.id,
                    prompt_id = %result.prompt_id,
                    images = result.images.len(),
                    "Generation succeeded",
                );
                JobOutcome::Success {
                    images: result.images.into_iter().map(stored_image).collect(),
                    completed_at: now(),
                }
            }
            Err(error) => {
                let message = self.redactor.redact(&error.to_string());
                tracing::warn!(
                    client_id = %session.client_id,
                    job_id = %job.id,
                    error = %message,
                    "Generation failed",
                );
                JobOutcome::Failed {
                    error: message,
                    completed_at: now(),
                }
            }
        };

        self.finish_job(&session, &job.id, outcome).await;
        self.pump(&session).await;
        })
    }

    /// Render, submit, and await one generation.
    async fn run_generation(
        &self,
        session: &UserSession,
        job: &Job,
    ) -> Result<GenerationResult, DriveError> {
        let inputs = WorkflowInputs {
            positive_prompt: job.positive_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            seed: job.seed,
            width: job.width,
            height: job.height,
        };
        let workflow = render_workflow(&self.template, &inputs)?;

        let prompt_id = self.backend.submit(&workflow, &session.client_id).await?;
        {
            let mut queue = session.queue.lock().await;
            queue.update(&job.id, |j| j.prompt_id = Some(prompt_id.clone()));
        }
        {
            let mut history = session.history.lock().await;
            history.set_prompt_id(&job.id, &prompt_id);
        }
        self.persist(session).await;

        let result = self
            .backend
            .await_completion(&prompt_id, &session.client_id)
            .await?;
        Ok(result)
    }

    /// Terminal bookkeeping shared by every outcome path: fold the
    /// outcome into the history entry, drop the job from the queue, and
    /// release exactly the slots its removal status held.
    async fn finish_job(&self, session: &UserSession, job_id: &str, outcome: JobOutcome) {
        let removed = {
            let mut queue = session.queue.lock().await;
            queue.remove(job_id)
        };
        if let Some(removed) = &removed {
            self.counters.release(&session.client_id, removed.status);
        }

        {
            let mut history = session.history.lock().await;
            if let Some(existing) = history.get(job_id).cloned() {
                history.upsert(existing.with_outcome(outcome));
            } else if let Some(job) = removed {
                // Entry was deleted mid-flight; only resurrect it for a
                // job we actually removed from the queue.
                history.upsert(HistoryEntry::running(&job).with_outcome(outcome));
            }
        }
        self.persist(session).await;
    }

    // ---- persistence ----

    /// Write both snapshots. Best effort: the gateway stays
    /// authoritative, so a failed write is logged and life goes on.
    pub(crate) async fn persist(&self, session: &UserSession) {
        let jobs = {
            let queue = session.queue.lock().await;
            queue.jobs().to_vec()
        };
        let history = {
            let history = session.history.lock().await;
            history.entries().to_vec()
        };

        match serde_json::to_value(&jobs) {
            Ok(value) => {
                if let Err(e) = self.store.save(&session.client_id, KEY_JOBS, &value).await {
                    tracing::warn!(client_id = %session.client_id, error = %e, "Failed to persist jobs snapshot");
                }
            }
            Err(e) => {
                tracing::warn!(client_id = %session.client_id, error = %e, "Failed to encode jobs snapshot");
            }
        }
        match serde_json::to_value(&history) {
            Ok(value) => {
                if let Err(e) = self
                    .store
                    .save(&session.client_id, KEY_HISTORY, &value)
                    .await
                {
                    tracing::warn!(client_id = %session.client_id, error = %e, "Failed to persist history snapshot");
                }
            }
            Err(e) => {
                tracing::warn!(client_id = %session.client_id, error = %e, "Failed to encode history snapshot");
            }
        }
    }
}

fn stored_image(artifact: ImageArtifact) -> StoredImage {
    StoredImage {
        file_name: artifact.file_name,
        mime_type: artifact.mime_type,
        data: artifact.data,
    }
}
