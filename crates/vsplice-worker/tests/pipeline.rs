//! End-to-end pipeline tests with in-memory capabilities.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::{Array2, ArrayView2};
use tempfile::TempDir;

use vsplice_media::{
    ClipEncoder, FrameStream, HistogramEmbedder, MediaError, MediaResult, RawFrame, StreamInfo,
    VideoDecoder,
};
use vsplice_models::{Checkpoint, JobId, JobStatus, RunMetadata, SceneAssignment, Stage};
use vsplice_worker::analysis::{DensityClusterer, RandomProjectionReducer};
use vsplice_worker::{
    Capabilities, Clusterer, ExecutorError, GuardConfig, JobExecutor, JobRegistry, MemoryProbe,
    MemoryUsage, NoopSink, Pipeline, PipelineConfig, PipelineError, PipelineResult,
    ProgressSink, ResourceGuard, SinkError,
};

/// Emits `colours[i]` as native frame `i`.
struct ColourDecoder {
    fps: f64,
    colours: Vec<[u8; 3]>,
}

struct ColourStream {
    info: StreamInfo,
    colours: std::vec::IntoIter<[u8; 3]>,
}

impl FrameStream for ColourStream {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        Ok(self.colours.next().map(|c| RawFrame {
            width: 8,
            height: 8,
            data: c.repeat(64),
        }))
    }
}

impl VideoDecoder for ColourDecoder {
    fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameStream>> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(Box::new(ColourStream {
            info: StreamInfo {
                fps: self.fps,
                frame_count: self.colours.len() as u64,
                width: 8,
                height: 8,
            },
            colours: self.colours.clone().into_iter(),
        }))
    }
}

/// Writes a placeholder file, failing for chunks that start at `fail_at`.
#[derive(Default)]
struct FakeEncoder {
    fail_at: Vec<f64>,
    cuts: Mutex<Vec<(f64, f64)>>,
}

impl ClipEncoder for FakeEncoder {
    fn cut(&self, _source: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()> {
        self.cuts.lock().unwrap().push((start, end));
        if self.fail_at.contains(&start) {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        std::fs::write(output, b"mp4").map_err(MediaError::from)
    }
}

/// Returns a fixed label list regardless of input.
struct FixedClusterer(Vec<i64>);

impl Clusterer for FixedClusterer {
    fn cluster(&self, _points: ArrayView2<'_, f32>, _min: usize) -> PipelineResult<Vec<i64>> {
        Ok(self.0.clone())
    }
}

/// Wraps [`FakeEncoder`] and raises `tripped` after every successful cut.
struct TrippingEncoder {
    inner: FakeEncoder,
    tripped: Arc<AtomicBool>,
}

impl ClipEncoder for TrippingEncoder {
    fn cut(&self, source: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()> {
        self.inner.cut(source, start, end, output)?;
        self.tripped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports usage over the ceiling once `tripped` is set.
struct TripwireMemory(Arc<AtomicBool>);

impl MemoryProbe for TripwireMemory {
    fn sample(&self) -> MemoryUsage {
        if self.0.load(Ordering::SeqCst) {
            MemoryUsage::new(900.0, 40.0)
        } else {
            MemoryUsage::new(100.0, 40.0)
        }
    }
}

struct ConstantProbe(MemoryUsage);

impl MemoryProbe for ConstantProbe {
    fn sample(&self) -> MemoryUsage {
        self.0
    }
}

struct FailingSink;

impl ProgressSink for FailingSink {
    fn emit(&self, _checkpoint: &Checkpoint) -> Result<(), SinkError> {
        Err(SinkError::new("dashboard offline"))
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Checkpoint>>);

impl ProgressSink for Recorder {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }
}

impl Recorder {
    fn stages(&self) -> Vec<Stage> {
        self.0.lock().unwrap().iter().map(|c| c.stage).collect()
    }

    fn last(&self) -> Checkpoint {
        self.0.lock().unwrap().last().cloned().unwrap()
    }
}

/// 10 seconds of red then 10 seconds of blue at 10 fps.
fn red_then_blue() -> Vec<[u8; 3]> {
    let mut colours = vec![[220, 20, 20]; 100];
    colours.extend(vec![[20, 20, 220]; 100]);
    colours
}

fn config(runs: &Path) -> PipelineConfig {
    PipelineConfig {
        runs_dir: runs.to_path_buf(),
        frame_rate: 1.0,
        clip_max_seconds: 5.0,
        guard: GuardConfig::disabled(),
        ..PipelineConfig::default()
    }
}

fn source(tmp: &TempDir) -> PathBuf {
    let path = tmp.path().join("input.mp4");
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

fn capabilities(clusterer: Arc<dyn Clusterer>, encoder: Arc<dyn ClipEncoder>) -> Capabilities {
    Capabilities {
        decoder: Arc::new(ColourDecoder {
            fps: 10.0,
            colours: red_then_blue(),
        }),
        embedder: Arc::new(HistogramEmbedder::default()),
        reducer: Arc::new(RandomProjectionReducer::new(10)),
        clusterer,
        encoder,
    }
}

fn two_scenes() -> Arc<dyn Clusterer> {
    let mut labels = vec![0i64; 10];
    labels.extend(vec![1i64; 10]);
    Arc::new(FixedClusterer(labels))
}

fn pipeline(config: PipelineConfig, caps: Capabilities) -> Pipeline {
    let guard = Arc::new(ResourceGuard::from_config(config.guard.clone()));
    Pipeline::new(config, caps, guard)
}

#[test]
fn test_run_writes_every_artifact() {
    let tmp = TempDir::new().unwrap();
    let encoder = Arc::new(FakeEncoder::default());
    let pipeline = pipeline(config(&tmp.path().join("runs")), capabilities(two_scenes(), encoder.clone()));
    let recorder = Recorder::default();

    let output = pipeline
        .run(&JobId::new(), &source(&tmp), Some("e2e"), &recorder)
        .unwrap();

    // Blocks [0,9] and [10,19], each split at 5 seconds
    let bounds: Vec<(f64, f64)> = output
        .metadata
        .clips
        .iter()
        .map(|c| (c.spec.start_time, c.spec.end_time))
        .collect();
    assert_eq!(bounds, vec![(0.0, 5.0), (5.0, 9.0), (10.0, 15.0), (15.0, 19.0)]);
    assert_eq!(output.metadata.clips[3].path, "clips/clip_001_1.mp4");
    assert!(output.run_dir.join("clips/clip_001_1.mp4").is_file());

    let clusters: SceneAssignment =
        serde_json::from_slice(&std::fs::read(output.run_dir.join("clusters.json")).unwrap()).unwrap();
    assert_eq!(clusters.len(), 20);
    assert_eq!(output.metadata.representatives.len(), 2);

    let metadata: RunMetadata =
        serde_json::from_slice(&std::fs::read(output.run_dir.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata.video_props.frame_count, 200);
    assert_eq!(metadata.frame_rate, 1.0);
    assert_eq!(metadata.embedding_model, "rgb-histogram-512");
    assert!(output.run_dir.join("representatives.json").is_file());
    assert!(output.run_dir.join("clips.json").is_file());
    assert!(output.run_dir.join("frames/frame_000019.jpg").is_file());
}

#[test]
fn test_checkpoints_bracket_every_stage() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(
        config(&tmp.path().join("runs")),
        capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
    );
    let recorder = Recorder::default();
    pipeline.run(&JobId::new(), &source(&tmp), None, &recorder).unwrap();

    let mut expected = vec![Stage::Init, Stage::Init];
    for stage in Stage::PIPELINE {
        expected.push(stage);
        expected.push(stage);
    }
    expected.push(Stage::Done);
    assert_eq!(recorder.stages(), expected);
}

#[test]
fn test_encode_failure_only_drops_that_clip() {
    let tmp = TempDir::new().unwrap();
    let encoder = Arc::new(FakeEncoder {
        fail_at: vec![5.0],
        ..FakeEncoder::default()
    });
    let pipeline = pipeline(config(&tmp.path().join("runs")), capabilities(two_scenes(), encoder.clone()));
    let recorder = Recorder::default();

    let output = pipeline.run(&JobId::new(), &source(&tmp), None, &recorder).unwrap();

    assert_eq!(encoder.cuts.lock().unwrap().len(), 4);
    assert_eq!(output.metadata.clips.len(), 3);
    assert!(output.metadata.clips.iter().all(|c| c.spec.start_time != 5.0));
    assert_eq!(recorder.last().stage, Stage::Done);
}

#[test]
fn test_capability_failure_aborts_with_failed_checkpoint() {
    let tmp = TempDir::new().unwrap();
    let runs = tmp.path().join("runs");
    let pipeline = pipeline(
        config(&runs),
        capabilities(Arc::new(FixedClusterer(vec![0, 1])), Arc::new(FakeEncoder::default())),
    );
    let recorder = Recorder::default();

    let failure = pipeline
        .run(&JobId::new(), &source(&tmp), None, &recorder)
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Segment);
    assert!(matches!(failure.source, PipelineError::Capability { .. }));

    let last = recorder.last();
    assert_eq!(last.stage, Stage::Failed);
    assert!(last.message.contains("segment"));
    assert!(!recorder.stages().contains(&Stage::Chunk));

    let run_dir = std::fs::read_dir(&runs).unwrap().next().unwrap().unwrap().path();
    assert!(!run_dir.join("clips.json").exists());
    assert_eq!(std::fs::read_dir(run_dir.join("clips")).unwrap().count(), 0);
}

#[test]
fn test_failing_sink_does_not_fail_run() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(
        config(&tmp.path().join("runs")),
        capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
    );

    let output = pipeline
        .run(&JobId::new(), &source(&tmp), None, &FailingSink)
        .unwrap();

    assert_eq!(output.metadata.clips.len(), 4);
    assert!(output.run_dir.join("metadata.json").is_file());
}

#[test]
fn test_late_failure_discards_encoded_clips() {
    let tmp = TempDir::new().unwrap();
    let runs = tmp.path().join("runs");
    let tripped = Arc::new(AtomicBool::new(false));
    let encoder = Arc::new(TrippingEncoder {
        inner: FakeEncoder::default(),
        tripped: tripped.clone(),
    });
    let guard = Arc::new(ResourceGuard::with_probe(
        GuardConfig::default(),
        Arc::new(TripwireMemory(tripped)),
    ));
    let pipeline = Pipeline::new(config(&runs), capabilities(two_scenes(), encoder.clone()), guard);
    let recorder = Recorder::default();

    let failure = pipeline
        .run(&JobId::new(), &source(&tmp), None, &recorder)
        .unwrap_err();

    // The guard check after the first batch of three cuts breaches the ceiling
    assert_eq!(failure.stage, Stage::Chunk);
    assert!(matches!(failure.source, PipelineError::ResourceExhausted { .. }));
    assert_eq!(encoder.inner.cuts.lock().unwrap().len(), 3);
    assert_eq!(recorder.last().stage, Stage::Failed);

    let run_dir = std::fs::read_dir(&runs).unwrap().next().unwrap().unwrap().path();
    assert_eq!(std::fs::read_dir(run_dir.join("clips")).unwrap().count(), 0);
    assert!(!run_dir.join("clips.json").exists());
    assert!(!run_dir.join("metadata.json").exists());
}

#[test]
fn test_missing_source_fails_before_workspace() {
    let tmp = TempDir::new().unwrap();
    let runs = tmp.path().join("runs");
    let pipeline = pipeline(
        config(&runs),
        capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
    );

    let failure = pipeline
        .run(&JobId::new(), &tmp.path().join("nope.mp4"), None, &NoopSink)
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Init);
    assert!(matches!(failure.source, PipelineError::Input(_)));
    assert!(!runs.exists());
}

#[test]
fn test_memory_ceiling_breach_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp.path().join("runs"));
    let probe = Arc::new(ConstantProbe(MemoryUsage::new(612.0, 40.0)));
    let guard = Arc::new(ResourceGuard::with_probe(GuardConfig::default(), probe));
    let pipeline = Pipeline::new(
        config,
        capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
        guard,
    );
    let recorder = Recorder::default();

    let failure = pipeline
        .run(&JobId::new(), &source(&tmp), None, &recorder)
        .unwrap_err();

    match failure.source {
        PipelineError::ResourceExhausted { used_mb, limit_mb } => {
            assert_eq!(used_mb, 612.0);
            assert_eq!(limit_mb, 450.0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(recorder.last().stage, Stage::Failed);
}

#[test]
fn test_default_analysis_covers_every_frame() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(
        config(&tmp.path().join("runs")),
        capabilities(Arc::new(DensityClusterer::new()), Arc::new(FakeEncoder::default())),
    );

    let output = pipeline.run(&JobId::new(), &source(&tmp), None, &NoopSink).unwrap();

    let clusters: SceneAssignment =
        serde_json::from_slice(&std::fs::read(output.run_dir.join("clusters.json")).unwrap()).unwrap();
    assert_eq!(clusters.len(), 20);
    assert_eq!(
        output.metadata.representatives.len(),
        clusters.distinct_scene_ids().len()
    );
    // Red and blue frames never share a scene
    assert_ne!(
        clusters.get("frames/frame_000000.jpg"),
        clusters.get("frames/frame_000019.jpg")
    );
}

#[test]
fn test_reduction_is_deterministic() {
    use vsplice_worker::Reducer;

    let data = Array2::from_shape_fn((6, 32), |(i, j)| ((i * 7 + j * 3) % 11) as f32);
    let reducer = RandomProjectionReducer::new(10);
    assert_eq!(
        reducer.reduce(data.view(), 42).unwrap(),
        reducer.reduce(data.view(), 42).unwrap()
    );
}

#[tokio::test]
async fn test_executor_tracks_job_outcomes() {
    let tmp = TempDir::new().unwrap();
    let registry = JobRegistry::new();
    let executor = JobExecutor::new(
        pipeline(
            config(&tmp.path().join("runs")),
            capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
        ),
        registry.clone(),
    );

    let good = executor.submit(source(&tmp), Some("a".into())).unwrap();
    let also_good = executor.submit(source(&tmp), Some("b".into())).unwrap();
    let bad = executor.submit(tmp.path().join("missing.mp4"), None).unwrap();
    let (good_id, also_good_id, bad_id) = (good.job_id.clone(), also_good.job_id.clone(), bad.job_id.clone());

    let first = good.wait().await.unwrap();
    let second = also_good.wait().await.unwrap();
    assert!(bad.wait().await.is_err());
    assert_ne!(first.run_dir, second.run_dir);

    let record = registry.get(&good_id).unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.last_stage, Some(Stage::Done));
    assert_eq!(record.run_dir, Some(first.run_dir.to_string_lossy().to_string()));
    assert_eq!(registry.get(&also_good_id).unwrap().status, JobStatus::Done);

    let failed = registry.get(&bad_id).unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert_eq!(failed.last_stage, Some(Stage::Failed));
    assert!(failed.error_message.unwrap().contains("Input error"));
}

#[tokio::test]
async fn test_closed_executor_fails_new_jobs() {
    let tmp = TempDir::new().unwrap();
    let executor = JobExecutor::new(
        pipeline(
            config(&tmp.path().join("runs")),
            capabilities(two_scenes(), Arc::new(FakeEncoder::default())),
        ),
        JobRegistry::new(),
    );

    executor.close();
    let handle = executor.submit(source(&tmp), None).unwrap();
    let job_id = handle.job_id.clone();

    assert!(matches!(handle.wait().await, Err(ExecutorError::Closed)));
    let record = executor.registry().get(&job_id).unwrap();
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(executor.registry().list().len(), 1);
    assert!(!tmp.path().join("runs").exists());
}
