//! Shared data models for the VideoSplice clip derivation engine.
//!
//! This crate provides Serde-serializable types for:
//! - Sampled frames and their embeddings
//! - Scene assignments and representative frames
//! - Blocks, planned clip chunks and encoded clips
//! - Pipeline stages and checkpoints
//! - Job identifiers and job-registry records

pub mod clip;
pub mod frame;
pub mod job;
pub mod metadata;
pub mod progress;
pub mod scene;
pub mod video;

// Re-export common types
pub use clip::{Block, ClipRecord, ClipSpec};
pub use frame::FrameRecord;
pub use job::{JobId, JobRecord, JobStatus, TransitionError};
pub use metadata::RunMetadata;
pub use progress::{Checkpoint, Stage};
pub use scene::{Representative, SceneAssignment, SceneId};
pub use video::VideoProps;
