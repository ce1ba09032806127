//! Durable history records of job outcomes.
//!
//! A [`HistoryEntry`] outlives its job: the live queue drops terminal
//! jobs, the history keeps one entry per job id so past results can be
//! rendered after the fact. The outcome is a tagged variant per status,
//! so fields like `images` or `error` only exist where they are
//! meaningful.

use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::types::Timestamp;

/// An image artifact stored inline with a history entry.
///
/// `data` is serialized as base64 text because history snapshots travel
/// as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub file_name: String,
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Outcome of a job, tagged by status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Submitted to the gateway, completion not yet observed.
    Running,
    /// Finished with at least one image.
    Success {
        images: Vec<StoredImage>,
        completed_at: Timestamp,
    },
    /// Failed; `error` is already redacted for display.
    Failed {
        error: String,
        completed_at: Timestamp,
    },
}

/// Durable record of a job's outcome, keyed by job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    /// Remote job identifier, once the gateway accepted the job.
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl HistoryEntry {
    /// Build a `Running` entry from a freshly admitted job.
    pub fn running(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            positive_prompt: job.positive_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            seed: job.seed,
            width: job.width,
            height: job.height,
            prompt_id: job.prompt_id.clone(),
            outcome: JobOutcome::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.outcome, JobOutcome::Running)
    }

    /// Completion time, for terminal outcomes.
    pub fn completed_at(&self) -> Option<Timestamp> {
        match &self.outcome {
            JobOutcome::Running => None,
            JobOutcome::Success { completed_at, .. } => Some(*completed_at),
            JobOutcome::Failed { completed_at, .. } => Some(*completed_at),
        }
    }

    /// Replace the outcome, keeping the descriptive fields.
    pub fn with_outcome(mut self, outcome: JobOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Serde adapter storing byte slices as base64 text.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}
