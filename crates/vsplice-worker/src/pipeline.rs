//! Pipeline orchestration.
//!
//! One run is a synchronous stage chain:
//!
//! ```text
//! Init -> Sample -> Embed -> Segment -> SelectRepresentatives -> Chunk -> AssembleMetadata -> Done
//! ```
//!
//! Any fatal error moves the run to `Failed` and stops it. Only clip chunks
//! that fail to encode are dropped without failing the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;
use vsplice_media::{
    ClipEncoder, EncodingConfig, FfmpegClipEncoder, FfmpegDecoder, FrameEmbedder,
    HistogramEmbedder, VideoDecoder,
};
use vsplice_models::{Checkpoint, JobId, RunMetadata, Stage};

use crate::analysis::{DensityClusterer, RandomProjectionReducer};
use crate::clipper::ClipBoundaryDeriver;
use crate::config::PipelineConfig;
use crate::embed::embed_frames;
use crate::error::{PipelineResult, StageFailure};
use crate::guard::ResourceGuard;
use crate::logging::JobLogger;
use crate::metadata::{MetadataAssembler, CLIPS_FILE, CLUSTERS_FILE, REPRESENTATIVES_FILE};
use crate::metrics;
use crate::progress::ProgressSink;
use crate::representatives::select_representatives;
use crate::sampler::{validate_source, FrameSampler};
use crate::segmenter::{Clusterer, Reducer, SceneSegmenter};
use crate::workspace::RunWorkspace;

/// External capabilities used by a pipeline, constructed once by the caller.
#[derive(Clone)]
pub struct Capabilities {
    pub decoder: Arc<dyn VideoDecoder>,
    pub embedder: Arc<dyn FrameEmbedder>,
    pub reducer: Arc<dyn Reducer>,
    pub clusterer: Arc<dyn Clusterer>,
    pub encoder: Arc<dyn ClipEncoder>,
}

impl Capabilities {
    /// FFmpeg decode/encode, colour-histogram embedding, random projection
    /// and density clustering.
    pub fn ffmpeg_defaults(config: &PipelineConfig) -> Self {
        Self {
            decoder: Arc::new(FfmpegDecoder::new()),
            embedder: Arc::new(HistogramEmbedder::new(config.embedding_model.clone())),
            reducer: Arc::new(RandomProjectionReducer::new(config.reduced_dims)),
            clusterer: Arc::new(DensityClusterer::new()),
            encoder: Arc::new(FfmpegClipEncoder::new(EncodingConfig::default())),
        }
    }
}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_dir: PathBuf,
    pub metadata: RunMetadata,
}

/// Sequences the derivation stages for one source video at a time.
pub struct Pipeline {
    config: PipelineConfig,
    capabilities: Capabilities,
    guard: Arc<ResourceGuard>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, capabilities: Capabilities, guard: Arc<ResourceGuard>) -> Self {
        Self {
            config,
            capabilities,
            guard,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for `source` in a fresh workspace.
    ///
    /// A fatal failure discards any clips already encoded, so a failed run
    /// leaves no clip output behind.
    pub fn run(
        &self,
        job_id: &JobId,
        source: &Path,
        prefix: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutput, StageFailure> {
        let logger = JobLogger::new(job_id);
        let _span = logger.run_span(source).entered();
        logger.run_started(source);

        let run = StageRunner {
            guard: &self.guard,
            sink,
            logger: &logger,
        };

        let mut workspace = None;
        match self.run_stages(&run, source, prefix, &mut workspace) {
            Ok(output) => {
                run.emit(Stage::Done, format!("Run complete: {}", output.run_dir.display()));
                metrics::record_job("done");
                logger.run_finished(&output.run_dir, output.metadata.clips.len());
                Ok(output)
            }
            Err(failure) => {
                if let Some(workspace) = &workspace {
                    discard_clip_output(workspace);
                }
                run.emit(Stage::Failed, failure.to_string());
                metrics::record_job(failure.source.kind());
                logger.run_failed(&failure);
                Err(failure)
            }
        }
    }

    fn run_stages(
        &self,
        run: &StageRunner<'_>,
        source: &Path,
        prefix: Option<&str>,
        created: &mut Option<RunWorkspace>,
    ) -> Result<RunOutput, StageFailure> {
        let caps = &self.capabilities;
        let config = &self.config;

        let workspace = run.stage(Stage::Init, || {
            let size = validate_source(source, config.max_video_bytes())?;
            let workspace = RunWorkspace::create(&config.runs_dir, prefix)?;
            let message = format!(
                "Workspace {} ready for {} byte source",
                workspace.path().display(),
                size
            );
            Ok((workspace, message))
        })?;
        *created = Some(workspace.clone());

        let sampled = run.stage(Stage::Sample, || {
            let sampled = FrameSampler::new(
                caps.decoder.as_ref(),
                &self.guard,
                config.frame_rate,
                config.fps_fallback,
            )
            .sample(source, &workspace)?;
            let message = format!(
                "Sampled {} frames from {:.1}s of video",
                sampled.frames.len(),
                sampled.props.duration
            );
            Ok((sampled, message))
        })?;
        let props = sampled.props;

        let frames = run.stage(Stage::Embed, || {
            let frames = embed_frames(sampled.frames, &workspace, caps.embedder.as_ref(), &self.guard)?;
            let message = format!(
                "Embedded {} frames with {}",
                frames.len(),
                caps.embedder.model_name()
            );
            Ok((frames, message))
        })?;

        let assignment = run.stage(Stage::Segment, || {
            let min_cluster_size = config.min_cluster_size(frames.len());
            let assignment = SceneSegmenter::new(caps.reducer.as_ref(), caps.clusterer.as_ref(), config.seed)
                .segment(&frames, min_cluster_size)?;
            workspace.write_json(CLUSTERS_FILE, &assignment)?;
            let message = format!(
                "Assigned {} frames to {} scenes",
                assignment.len(),
                assignment.distinct_scene_ids().len()
            );
            Ok((assignment, message))
        })?;

        let representatives = run.stage(Stage::SelectRepresentatives, || {
            let representatives = select_representatives(&frames, &assignment)?;
            workspace.write_json(REPRESENTATIVES_FILE, &representatives)?;
            let message = format!("Selected {} representative frames", representatives.len());
            Ok((representatives, message))
        })?;

        let clips = run.stage(Stage::Chunk, || {
            let clips = ClipBoundaryDeriver::new(caps.encoder.as_ref(), &self.guard, config.clip_max_seconds)
                .run(source, &frames, &assignment, &workspace)?;
            workspace.write_json(CLIPS_FILE, &clips)?;
            let message = format!("Encoded {} clips", clips.len());
            Ok((clips, message))
        })?;

        let metadata = run.stage(Stage::AssembleMetadata, || {
            let metadata = MetadataAssembler::new(&workspace, config.frame_rate, caps.embedder.model_name())
                .assemble(props, representatives, clips)?;
            Ok((metadata, "Metadata written".to_string()))
        })?;

        Ok(RunOutput {
            run_dir: workspace.path().to_path_buf(),
            metadata,
        })
    }
}

/// Wraps every stage with checkpoints, guard checks and timing.
struct StageRunner<'a> {
    guard: &'a ResourceGuard,
    sink: &'a dyn ProgressSink,
    logger: &'a JobLogger,
}

impl StageRunner<'_> {
    fn emit(&self, stage: Stage, message: impl Into<String>) {
        let checkpoint = Checkpoint::new(stage, message);
        if let Err(e) = self.sink.emit(&checkpoint) {
            self.logger.sink_failed(stage, &e);
        }
    }

    fn stage<T>(
        &self,
        stage: Stage,
        body: impl FnOnce() -> PipelineResult<(T, String)>,
    ) -> Result<T, StageFailure> {
        self.logger.stage_started(stage);
        self.emit(stage, format!("Starting {}", stage));
        let started = Instant::now();

        let result = self
            .guard
            .check(stage.as_str())
            .and_then(|_| body())
            .and_then(|out| self.guard.check(stage.as_str()).map(|_| out));

        let elapsed = started.elapsed();
        metrics::record_stage_duration(stage, elapsed.as_secs_f64());

        match result {
            Ok((value, message)) => {
                self.logger.stage_finished(stage, elapsed, &message);
                self.emit(stage, message);
                Ok(value)
            }
            Err(source) => Err(StageFailure::new(stage, source)),
        }
    }
}

/// Remove encoded clips and the clip list of a failed run.
fn discard_clip_output(workspace: &RunWorkspace) {
    match workspace.clear_clips() {
        Ok(0) => {}
        Ok(removed) => warn!(
            run_dir = %workspace.path().display(),
            removed,
            "Discarded clips of failed run"
        ),
        Err(e) => warn!(run_dir = %workspace.path().display(), "Failed to discard clips: {}", e),
    }
    let clip_list = workspace.resolve(CLIPS_FILE);
    if let Err(e) = std::fs::remove_file(&clip_list) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %clip_list.display(), "Failed to remove clip list: {}", e);
        }
    }
}
