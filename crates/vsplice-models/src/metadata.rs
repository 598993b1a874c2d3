//! Consolidated run metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ClipRecord, Representative, VideoProps};

/// The consolidated `metadata.json` document of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunMetadata {
    /// Absolute path of the run directory
    pub run_dir: String,
    pub video_props: VideoProps,
    /// Target sampling rate in frames per second
    pub frame_rate: f64,
    /// Label of the embedding capability used for this run
    pub embedding_model: String,
    pub representatives: Vec<Representative>,
    pub clips: Vec<ClipRecord>,
    pub created_at: DateTime<Utc>,
}
