//! Pipeline error types.

use std::fmt;

use thiserror::Error;
use vsplice_media::MediaError;
use vsplice_models::Stage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// External capability a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Decode,
    Embed,
    Reduce,
    Cluster,
    Encode,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Decode => "decode",
            Capability::Embed => "embed",
            Capability::Reduce => "reduce",
            Capability::Cluster => "cluster",
            Capability::Encode => "encode",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing, empty, oversized or undecodable source video.
    #[error("Input error: {0}")]
    Input(String),

    /// Stage-to-stage contract violation.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Resource exhausted: {used_mb:.1} MB in use, limit {limit_mb:.1} MB")]
    ResourceExhausted { used_mb: f64, limit_mb: f64 },

    #[error("{capability} capability failed: {message}")]
    Capability {
        capability: Capability,
        message: String,
    },

    /// A single clip chunk failed to materialize. Recovered by the clipper.
    #[error("Clip {block_sequence:03}_{chunk_index} failed to encode: {message}")]
    PartialEncoding {
        block_sequence: usize,
        chunk_index: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn capability(capability: Capability, msg: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: msg.into(),
        }
    }

    /// Classify a media failure raised by a capability.
    ///
    /// Problems with the source itself become input errors.
    pub fn from_media(capability: Capability, err: MediaError) -> Self {
        if err.is_input_problem() {
            Self::Input(err.to_string())
        } else {
            Self::capability(capability, err.to_string())
        }
    }

    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Input(_) => "input",
            PipelineError::Integrity(_) => "integrity",
            PipelineError::ResourceExhausted { .. } => "resource_exhausted",
            PipelineError::Capability { .. } => "capability",
            PipelineError::PartialEncoding { .. } => "partial_encoding",
            PipelineError::Io(_) => "io",
            PipelineError::Json(_) => "json",
        }
    }
}

/// A fatal failure together with the stage it happened in.
#[derive(Debug, Error)]
#[error("Stage {stage} failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, source: PipelineError) -> Self {
        Self { stage, source }
    }
}
