//! Clip boundary derivation and chunk encoding.

use std::path::Path;

use tracing::{info, warn};
use vsplice_media::ClipEncoder;
use vsplice_models::{Block, ClipRecord, ClipSpec, FrameRecord, SceneAssignment};

use crate::config::MIN_CLIP_SECONDS;
use crate::error::{PipelineError, PipelineResult};
use crate::guard::ResourceGuard;
use crate::metrics;
use crate::workspace::RunWorkspace;

/// Result of encoding one chunk.
#[derive(Debug)]
pub enum ChunkOutcome {
    Encoded(ClipRecord),
    /// The chunk failed to encode and was dropped
    Skipped { spec: ClipSpec, error: PipelineError },
}

impl ChunkOutcome {
    pub fn clip(&self) -> Option<&ClipRecord> {
        match self {
            ChunkOutcome::Encoded(record) => Some(record),
            ChunkOutcome::Skipped { .. } => None,
        }
    }
}

/// Group frames into maximal runs of one scene id, in index order.
///
/// A block spans from its first to its last frame timestamp. Every frame
/// must have a scene assignment; empty input yields no blocks.
pub fn build_blocks(frames: &[FrameRecord], assignment: &SceneAssignment) -> PipelineResult<Vec<Block>> {
    if frames.is_empty() || assignment.is_empty() {
        return Ok(Vec::new());
    }

    let missing = assignment.missing(frames);
    if !missing.is_empty() {
        return Err(PipelineError::integrity(format!(
            "{} frame(s) lack a scene assignment, first: {}",
            missing.len(),
            missing[0]
        )));
    }

    let mut ordered: Vec<&FrameRecord> = frames.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let mut blocks: Vec<Block> = Vec::new();
    for frame in ordered {
        let scene_id = assignment
            .get(&frame.identifier)
            .ok_or_else(|| PipelineError::integrity(format!("frame {} has no scene", frame.identifier)))?;

        match blocks.last_mut() {
            Some(block) if block.scene_id == scene_id => block.end_time = frame.timestamp,
            _ => blocks.push(Block {
                scene_id,
                start_time: frame.timestamp,
                end_time: frame.timestamp,
            }),
        }
    }

    Ok(blocks)
}

/// Split a block into consecutive chunks of at most `max_seconds`.
///
/// The last chunk carries the remainder. Blocks and chunks with
/// non-positive duration are skipped. A non-positive or non-finite maximum
/// keeps the block whole; a positive one is raised to [`MIN_CLIP_SECONDS`].
pub fn plan_chunks(block: &Block, block_sequence: usize, max_seconds: f64) -> Vec<ClipSpec> {
    let duration = block.duration();
    if !(duration > 0.0) {
        warn!(
            scene_id = block.scene_id,
            block_sequence,
            start_sec = block.start_time,
            end_sec = block.end_time,
            "Skipping block with non-positive duration"
        );
        return Vec::new();
    }

    let max_seconds = if max_seconds.is_finite() && max_seconds > 0.0 {
        max_seconds.max(MIN_CLIP_SECONDS)
    } else {
        duration
    };

    let n_chunks = ((duration / max_seconds).ceil() as usize).max(1);
    let chunk_len = duration.min(max_seconds);

    (0..n_chunks)
        .filter_map(|chunk_index| {
            let start_time = block.start_time + chunk_index as f64 * chunk_len;
            let end_time = (start_time + chunk_len).min(block.end_time);
            if !(end_time > start_time) {
                warn!(
                    scene_id = block.scene_id,
                    block_sequence,
                    chunk_index,
                    "Skipping chunk with non-positive duration"
                );
                return None;
            }
            Some(ClipSpec {
                scene_id: block.scene_id,
                start_time,
                end_time,
                block_sequence,
                chunk_index,
            })
        })
        .collect()
}

/// Turns scene assignments into encoded clips.
pub struct ClipBoundaryDeriver<'a> {
    encoder: &'a dyn ClipEncoder,
    guard: &'a ResourceGuard,
    max_clip_seconds: f64,
}

impl<'a> ClipBoundaryDeriver<'a> {
    pub fn new(encoder: &'a dyn ClipEncoder, guard: &'a ResourceGuard, max_clip_seconds: f64) -> Self {
        Self {
            encoder,
            guard,
            max_clip_seconds,
        }
    }

    /// Plan every chunk in block discovery order.
    pub fn derive(&self, frames: &[FrameRecord], assignment: &SceneAssignment) -> PipelineResult<Vec<ClipSpec>> {
        let blocks = build_blocks(frames, assignment)?;
        let specs: Vec<ClipSpec> = blocks
            .iter()
            .enumerate()
            .flat_map(|(seq, block)| plan_chunks(block, seq, self.max_clip_seconds))
            .collect();

        info!(
            blocks = blocks.len(),
            chunks = specs.len(),
            max_clip_seconds = self.max_clip_seconds,
            "Derived clip boundaries"
        );
        Ok(specs)
    }

    /// Encode each chunk. Encode failures skip the chunk; guard failures abort.
    pub fn realize(
        &self,
        source: &Path,
        specs: &[ClipSpec],
        workspace: &RunWorkspace,
    ) -> PipelineResult<Vec<ChunkOutcome>> {
        let mut outcomes = Vec::with_capacity(specs.len());

        for batch in specs.chunks(self.guard.batch_size()) {
            for spec in batch {
                outcomes.push(self.encode_one(source, spec, workspace));
            }
            self.guard.check("clip encoding")?;
        }

        Ok(outcomes)
    }

    fn encode_one(&self, source: &Path, spec: &ClipSpec, workspace: &RunWorkspace) -> ChunkOutcome {
        let identifier = RunWorkspace::clip_identifier(&spec.file_name());
        let output = workspace.resolve(&identifier);

        match self
            .encoder
            .cut(source, spec.start_time, spec.end_time, &output)
        {
            Ok(()) => {
                metrics::record_clip_encoded();
                info!(
                    scene_id = spec.scene_id,
                    start_sec = spec.start_time,
                    end_sec = spec.end_time,
                    path = %identifier,
                    "Encoded clip"
                );
                ChunkOutcome::Encoded(ClipRecord {
                    path: identifier,
                    spec: *spec,
                })
            }
            Err(e) => {
                metrics::record_clip_failure();
                let error = PipelineError::PartialEncoding {
                    block_sequence: spec.block_sequence,
                    chunk_index: spec.chunk_index,
                    message: e.to_string(),
                };
                warn!(
                    scene_id = spec.scene_id,
                    start_sec = spec.start_time,
                    end_sec = spec.end_time,
                    "Skipping clip: {}",
                    error
                );
                ChunkOutcome::Skipped { spec: *spec, error }
            }
        }
    }

    /// Derive and encode, returning the clips that materialized.
    pub fn run(
        &self,
        source: &Path,
        frames: &[FrameRecord],
        assignment: &SceneAssignment,
        workspace: &RunWorkspace,
    ) -> PipelineResult<Vec<ClipRecord>> {
        let specs = self.derive(frames, assignment)?;
        let outcomes = self.realize(source, &specs, workspace)?;

        let clips: Vec<ClipRecord> = outcomes.iter().filter_map(|o| o.clip().cloned()).collect();
        let skipped = outcomes.len() - clips.len();
        if skipped > 0 {
            warn!(encoded = clips.len(), skipped, "Some clips failed to encode");
        }
        Ok(clips)
    }
}
