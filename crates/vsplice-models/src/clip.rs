//! Blocks, planned clip chunks and encoded clips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::SceneId;

/// Maximal contiguous run of frames sharing one scene id.
///
/// Two blocks may share a `scene_id` when clustering assigned that id at two
/// separate points in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Block {
    pub scene_id: SceneId,
    /// Timestamp of the first frame in the run
    pub start_time: f64,
    /// Timestamp of the last frame in the run
    pub end_time: f64,
}

impl Block {
    /// Block duration in seconds. Single-frame blocks have zero duration.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A bounded-duration chunk of a block, ready to be cut.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipSpec {
    pub scene_id: SceneId,
    pub start_time: f64,
    pub end_time: f64,
    /// Position of the source block in discovery order
    pub block_sequence: usize,
    /// Position of this chunk inside its block
    pub chunk_index: usize,
}

impl ClipSpec {
    /// Chunk duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// File name of the encoded chunk inside the clips directory.
    pub fn file_name(&self) -> String {
        format!("clip_{:03}_{}.mp4", self.block_sequence, self.chunk_index)
    }
}

/// A clip that was successfully encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRecord {
    /// Workspace-relative path of the encoded file
    pub path: String,
    #[serde(flatten)]
    pub spec: ClipSpec,
}
