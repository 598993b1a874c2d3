//! Pipeline stages and progress checkpoints.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stage of the derivation pipeline.
///
/// Stages run in declaration order from `Init` to `Done`. `Failed` is
/// terminal and reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Sample,
    Embed,
    Segment,
    SelectRepresentatives,
    Chunk,
    AssembleMetadata,
    Done,
    Failed,
}

impl Stage {
    /// Working stages in execution order.
    pub const PIPELINE: [Stage; 6] = [
        Stage::Sample,
        Stage::Embed,
        Stage::Segment,
        Stage::SelectRepresentatives,
        Stage::Chunk,
        Stage::AssembleMetadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Sample => "sample",
            Stage::Embed => "embed",
            Stage::Segment => "segment",
            Stage::SelectRepresentatives => "select_representatives",
            Stage::Chunk => "chunk",
            Stage::AssembleMetadata => "assemble_metadata",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// The stage that follows this one on the success path.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Sample),
            Stage::Sample => Some(Stage::Embed),
            Stage::Embed => Some(Stage::Segment),
            Stage::Segment => Some(Stage::SelectRepresentatives),
            Stage::SelectRepresentatives => Some(Stage::Chunk),
            Stage::Chunk => Some(Stage::AssembleMetadata),
            Stage::AssembleMetadata => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A progress event emitted by the orchestrator.
///
/// Checkpoints are handed to a progress sink and never persisted by the
/// pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    pub stage: Stage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time.
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
