//! Job identifiers and job-registry records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{Checkpoint, Stage};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is running
    #[default]
    Processing,
    /// Job finished and its run directory is complete
    Done,
    /// Job failed with an error
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected job status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition for {job_id}: {from} -> {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Registry snapshot of one job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Run directory, set once the job is done
    pub run_dir: Option<String>,
    /// Error message if the job failed
    pub error_message: Option<String>,
    /// Stage of the latest checkpoint
    pub last_stage: Option<Stage>,
    /// Message of the latest checkpoint
    pub last_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of checkpoints recorded (monotonically increasing)
    pub event_seq: u64,
}

impl JobRecord {
    /// Create a record in the `processing` state.
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Processing,
            run_dir: None,
            error_message: None,
            last_stage: None,
            last_message: None,
            started_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a progress checkpoint.
    pub fn record_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.last_stage = Some(checkpoint.stage);
        self.last_message = Some(checkpoint.message.clone());
        self.updated_at = checkpoint.timestamp;
        self.event_seq += 1;
    }

    /// Mark job as done. Only valid from `processing`.
    pub fn complete(&mut self, run_dir: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Done)?;
        self.run_dir = Some(run_dir.into());
        Ok(())
    }

    /// Mark job as failed. Only valid from `processing`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Error)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing {
            return Err(TransitionError {
                job_id: self.job_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        self.event_seq += 1;
        Ok(())
    }
}
