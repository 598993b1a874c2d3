//! Structured logging for pipeline runs.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn, Span};
use vsplice_models::{Checkpoint, JobId, Stage};

use crate::error::StageFailure;
use crate::progress::SinkError;

/// Logs the lifecycle of one run with a consistent `job_id` field.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
        }
    }

    /// Span covering a whole run. Capability output logged inside it
    /// inherits the job fields.
    pub fn run_span(&self, source: &Path) -> Span {
        tracing::info_span!(
            "derive_clips",
            job_id = %self.job_id,
            source = %source.display()
        )
    }

    pub fn run_started(&self, source: &Path) {
        info!(job_id = %self.job_id, source = %source.display(), "Run started");
    }

    pub fn stage_started(&self, stage: Stage) {
        debug!(job_id = %self.job_id, stage = %stage, "Stage started");
    }

    pub fn stage_finished(&self, stage: Stage, elapsed: Duration, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = %stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "{}", message
        );
    }

    /// A checkpoint delivered through a log-only sink.
    pub fn checkpoint(&self, checkpoint: &Checkpoint) {
        info!(
            job_id = %self.job_id,
            stage = %checkpoint.stage,
            "Checkpoint: {}", checkpoint.message
        );
    }

    pub fn sink_failed(&self, stage: Stage, err: &SinkError) {
        warn!(job_id = %self.job_id, stage = %stage, "{}", err);
    }

    pub fn run_finished(&self, run_dir: &Path, clips: usize) {
        info!(
            job_id = %self.job_id,
            run_dir = %run_dir.display(),
            clips,
            "Run complete"
        );
    }

    pub fn run_failed(&self, failure: &StageFailure) {
        error!(
            job_id = %self.job_id,
            stage = %failure.stage,
            kind = failure.source.kind(),
            "Run failed: {}", failure.source
        );
    }
}
