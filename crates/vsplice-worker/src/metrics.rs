//! Pipeline metrics.
//!
//! Only the `metrics` facade is used here; installing a recorder is left to
//! the embedding application.

use metrics::{counter, histogram};
use vsplice_models::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const CLIPS_ENCODED_TOTAL: &str = "vsplice_clips_encoded_total";
    pub const CLIP_FAILURES_TOTAL: &str = "vsplice_clip_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "vsplice_stage_duration_seconds";
    pub const JOBS_TOTAL: &str = "vsplice_jobs_total";
}

/// Record a successfully encoded clip chunk.
pub fn record_clip_encoded() {
    counter!(names::CLIPS_ENCODED_TOTAL).increment(1);
}

/// Record a skipped clip chunk.
pub fn record_clip_failure() {
    counter!(names::CLIP_FAILURES_TOTAL).increment(1);
}

/// Record how long a stage ran.
pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished job. `outcome` is `done` or an error kind.
pub fn record_job(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}
