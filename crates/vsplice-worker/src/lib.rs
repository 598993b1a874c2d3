//! Video-to-clip derivation engine.
//!
//! This crate provides:
//! - Run workspaces and the memory guard
//! - Frame sampling, embedding and scene segmentation
//! - Representative selection and clip chunking
//! - The stage orchestrator with progress sinks
//! - A job registry and a bounded-concurrency executor

pub mod analysis;
pub mod clipper;
pub mod config;
pub mod embed;
pub mod error;
pub mod executor;
pub mod guard;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod representatives;
pub mod sampler;
pub mod segmenter;
pub mod workspace;

pub use clipper::{build_blocks, plan_chunks, ChunkOutcome, ClipBoundaryDeriver};
pub use config::{GuardConfig, PipelineConfig};
pub use error::{Capability, PipelineError, PipelineResult, StageFailure};
pub use executor::{ExecutorError, JobExecutor, JobHandle};
pub use guard::{MemoryLevel, MemoryProbe, MemoryUsage, ResourceGuard, SysinfoProbe};
pub use logging::JobLogger;
pub use pipeline::{Capabilities, Pipeline, RunOutput};
pub use progress::{FanoutSink, LogSink, NoopSink, ProgressSink, RegistrySink, SinkError};
pub use registry::{JobRegistry, RegistryError};
pub use segmenter::{resegment_noise, Clusterer, Reducer, SceneSegmenter, NOISE};
pub use workspace::RunWorkspace;
