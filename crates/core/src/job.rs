//! Job records tracked through the generation queue.
//!
//! A [`Job`] is created client-side at submission time with status
//! [`JobStatus::Queued`], transitions to `Running` when the admission
//! controller grants it a slot, and is removed from the live queue once
//! terminal. Its outcome survives in the history store
//! (see [`crate::history`]).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest accepted seed value (`2^31 - 1`).
pub const MAX_SEED: i64 = i32::MAX as i64;

/// Sentinel seed meaning "assign randomly at submission".
pub const SEED_RANDOM: i64 = -1;

/// Lifecycle state of a job.
///
/// `Queued -> Running -> {Success, Failed}`. Terminal states are removed
/// from the live queue; the history store keeps the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// User-supplied parameters for a new generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// `-1` means "assign randomly"; otherwise must be in `[0, 2^31 - 1]`.
    #[serde(default = "default_seed")]
    pub seed: i64,
    pub width: u32,
    pub height: u32,
}

fn default_seed() -> i64 {
    SEED_RANDOM
}

/// A unit of requested work, tracked through the live queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier, generated client-side at submission.
    pub id: String,
    pub status: JobStatus,
    pub positive_prompt: String,
    pub negative_prompt: String,
    /// Concrete seed; always non-negative once the job exists.
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    /// Remote job identifier assigned by the gateway once accepted.
    /// Absent while queued.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

impl Job {
    /// Build a queued job from a validated request.
    ///
    /// Generates a time-ordered UUIDv7 id and resolves the seed sentinel
    /// to a concrete value.
    pub fn from_request(request: &JobRequest) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            status: JobStatus::Queued,
            positive_prompt: request.positive_prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            seed: resolve_seed(request.seed),
            width: request.width,
            height: request.height,
            prompt_id: None,
        }
    }
}

/// Resolve the seed sentinel to a concrete value.
///
/// Negative seeds are replaced with a uniform random value in
/// `[0, 2^31 - 1)`; non-negative seeds pass through unchanged.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed < 0 {
        rand::rng().random_range(0..MAX_SEED)
    } else {
        seed
    }
}

/// Validate a submission request before a job is created from it.
pub fn validate_request(request: &JobRequest) -> Result<(), CoreError> {
    if request.width == 0 || request.height == 0 {
        return Err(CoreError::Validation(format!(
            "Image dimensions must be positive, got {}x{}",
            request.width, request.height
        )));
    }
    if request.seed > MAX_SEED {
        return Err(CoreError::Validation(format!(
            "Seed must not exceed {MAX_SEED}, got {}",
            request.seed
        )));
    }
    Ok(())
}
