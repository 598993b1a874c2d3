//! Scene segmentation.
//!
//! Embeddings are reduced to a low-dimensional space, density-clustered and
//! then post-processed so that every frame ends up with a concrete scene id.
//! Each contiguous run of noise frames becomes its own freshly minted scene.

use ndarray::{Array2, ArrayView2};
use tracing::{debug, info};
use vsplice_models::{FrameRecord, SceneAssignment, SceneId};

use crate::error::{Capability, PipelineError, PipelineResult};

/// Clustering label for points that belong to no cluster.
pub const NOISE: i64 = -1;

/// Reduction capability: neighbourhood-preserving projection to fewer dimensions.
///
/// Implementations must be deterministic for a fixed seed.
pub trait Reducer: Send + Sync {
    fn reduce(&self, vectors: ArrayView2<'_, f32>, seed: u64) -> PipelineResult<Array2<f32>>;
}

/// Clustering capability: one label per row, [`NOISE`] for unclustered points.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, points: ArrayView2<'_, f32>, min_cluster_size: usize) -> PipelineResult<Vec<i64>>;
}

/// Replace every contiguous run of noise labels with a fresh scene id.
///
/// Labels are walked in chronological order. The first fresh id is one past
/// the highest cluster label, and each new noise run takes the next id, so
/// minted ids never collide with cluster ids or with each other. Fails when
/// an id does not fit in [`SceneId`].
pub fn resegment_noise(labels: &[i64]) -> PipelineResult<Vec<SceneId>> {
    let mut next_id = labels
        .iter()
        .copied()
        .filter(|l| *l >= 0)
        .max()
        .map_or(0, |max| max.saturating_add(1));

    let mut out = Vec::with_capacity(labels.len());
    let mut prev_noise = false;
    let mut current_noise_id = 0;

    for &label in labels {
        let id = if label < 0 {
            if !prev_noise {
                current_noise_id = next_id;
                next_id = next_id.saturating_add(1);
            }
            current_noise_id
        } else {
            label
        };
        prev_noise = label < 0;

        let scene_id = SceneId::try_from(id).map_err(|_| {
            PipelineError::capability(
                Capability::Cluster,
                format!("scene id {} is out of range", id),
            )
        })?;
        out.push(scene_id);
    }
    Ok(out)
}

/// Assigns a scene id to every frame.
pub struct SceneSegmenter<'a> {
    reducer: &'a dyn Reducer,
    clusterer: &'a dyn Clusterer,
    seed: u64,
}

impl<'a> SceneSegmenter<'a> {
    pub fn new(reducer: &'a dyn Reducer, clusterer: &'a dyn Clusterer, seed: u64) -> Self {
        Self {
            reducer,
            clusterer,
            seed,
        }
    }

    /// Segment frames into scenes.
    ///
    /// Fewer than two frames all get scene 0 without running the capabilities.
    pub fn segment(
        &self,
        frames: &[FrameRecord],
        min_cluster_size: usize,
    ) -> PipelineResult<SceneAssignment> {
        let mut ordered: Vec<&FrameRecord> = frames.iter().collect();
        ordered.sort_by_key(|f| f.index);

        if ordered.len() < 2 {
            debug!(frames = ordered.len(), "Too few frames to cluster, using scene 0");
            return Ok(ordered
                .iter()
                .map(|f| (f.identifier.clone(), 0))
                .collect());
        }

        let matrix = embedding_matrix(&ordered)?;
        let n = matrix.nrows();

        let reduced = self.reducer.reduce(matrix.view(), self.seed)?;
        if reduced.nrows() != n {
            return Err(PipelineError::capability(
                Capability::Reduce,
                format!("returned {} rows for {} frames", reduced.nrows(), n),
            ));
        }

        let labels = self.clusterer.cluster(reduced.view(), min_cluster_size)?;
        validate_labels(&labels, n)?;

        let clusters = labels.iter().filter(|l| **l >= 0).max().map_or(0, |m| m + 1);
        let noise = labels.iter().filter(|l| **l < 0).count();
        let scene_ids = resegment_noise(&labels)?;

        let assignment: SceneAssignment = ordered
            .iter()
            .zip(scene_ids)
            .map(|(f, id)| (f.identifier.clone(), id))
            .collect();

        info!(
            frames = n,
            reduced_dims = reduced.ncols(),
            min_cluster_size,
            clusters,
            noise_frames = noise,
            scenes = assignment.distinct_scene_ids().len(),
            "Segmentation complete"
        );
        Ok(assignment)
    }
}

/// Stack embeddings into an `N x D` matrix.
fn embedding_matrix(frames: &[&FrameRecord]) -> PipelineResult<Array2<f32>> {
    let mut dim = None;
    let mut data = Vec::new();

    for frame in frames {
        let embedding = frame.embedding().ok_or_else(|| {
            PipelineError::integrity(format!("frame {} has no embedding", frame.identifier))
        })?;
        match dim {
            None => dim = Some(embedding.len()),
            Some(d) if d != embedding.len() => {
                return Err(PipelineError::integrity(format!(
                    "frame {} has a {}-dimensional embedding, expected {}",
                    frame.identifier,
                    embedding.len(),
                    d
                )));
            }
            Some(_) => {}
        }
        data.extend_from_slice(embedding);
    }

    let dim = dim.unwrap_or(0);
    Array2::from_shape_vec((frames.len(), dim), data)
        .map_err(|e| PipelineError::integrity(format!("embedding matrix: {}", e)))
}

fn validate_labels(labels: &[i64], n: usize) -> PipelineResult<()> {
    if labels.len() != n {
        return Err(PipelineError::capability(
            Capability::Cluster,
            format!("returned {} labels for {} frames", labels.len(), n),
        ));
    }
    if let Some(bad) = labels
        .iter()
        .find(|l| **l < NOISE || **l >= SceneId::MAX as i64)
    {
        return Err(PipelineError::capability(
            Capability::Cluster,
            format!("returned out-of-range label {}", bad),
        ));
    }
    Ok(())
}
