//! Run artifacts and the consolidated metadata document.

use chrono::Utc;
use vsplice_models::{ClipRecord, Representative, RunMetadata, VideoProps};

use crate::error::PipelineResult;
use crate::workspace::RunWorkspace;

pub const CLUSTERS_FILE: &str = "clusters.json";
pub const REPRESENTATIVES_FILE: &str = "representatives.json";
pub const CLIPS_FILE: &str = "clips.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Merges the outputs of one run into `metadata.json`.
pub struct MetadataAssembler<'a> {
    workspace: &'a RunWorkspace,
    frame_rate: f64,
    embedding_model: &'a str,
}

impl<'a> MetadataAssembler<'a> {
    pub fn new(workspace: &'a RunWorkspace, frame_rate: f64, embedding_model: &'a str) -> Self {
        Self {
            workspace,
            frame_rate,
            embedding_model,
        }
    }

    /// Build the document and persist it in the run directory.
    pub fn assemble(
        &self,
        video_props: VideoProps,
        representatives: Vec<Representative>,
        clips: Vec<ClipRecord>,
    ) -> PipelineResult<RunMetadata> {
        let metadata = RunMetadata {
            run_dir: self.workspace.path().to_string_lossy().to_string(),
            video_props,
            frame_rate: self.frame_rate,
            embedding_model: self.embedding_model.to_string(),
            representatives,
            clips,
            created_at: Utc::now(),
        };

        self.workspace.write_json(METADATA_FILE, &metadata)?;
        Ok(metadata)
    }
}
