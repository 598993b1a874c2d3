//! Representative frame selection.

use std::collections::HashMap;

use tracing::debug;
use vsplice_models::{FrameRecord, Representative, SceneAssignment, SceneId};

use crate::error::{PipelineError, PipelineResult};

/// Pick the frame nearest each scene's centroid.
///
/// Returns one representative per distinct scene id, in order of each
/// scene's first appearance. Distance ties go to the earliest frame.
pub fn select_representatives(
    frames: &[FrameRecord],
    assignment: &SceneAssignment,
) -> PipelineResult<Vec<Representative>> {
    let mut ordered: Vec<&FrameRecord> = frames.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let mut scene_order: Vec<SceneId> = Vec::new();
    let mut groups: HashMap<SceneId, Vec<&FrameRecord>> = HashMap::new();
    for frame in ordered {
        let scene_id = assignment.get(&frame.identifier).ok_or_else(|| {
            PipelineError::integrity(format!("frame {} has no scene assignment", frame.identifier))
        })?;
        groups
            .entry(scene_id)
            .or_insert_with(|| {
                scene_order.push(scene_id);
                Vec::new()
            })
            .push(frame);
    }

    let mut representatives = Vec::with_capacity(scene_order.len());
    for scene_id in scene_order {
        let members = &groups[&scene_id];
        let chosen = nearest_to_centroid(members)?;
        debug!(
            scene_id,
            members = members.len(),
            index = chosen.index,
            "Selected representative"
        );

        representatives.push(Representative {
            scene_id,
            identifier: chosen.identifier.clone(),
            index: chosen.index,
            timestamp: chosen.timestamp,
            embedding: chosen.embedding.clone().unwrap_or_default(),
        });
    }

    Ok(representatives)
}

fn nearest_to_centroid<'a>(members: &[&'a FrameRecord]) -> PipelineResult<&'a FrameRecord> {
    let embeddings = members
        .iter()
        .map(|f| {
            f.embedding().ok_or_else(|| {
                PipelineError::integrity(format!("frame {} has no embedding", f.identifier))
            })
        })
        .collect::<PipelineResult<Vec<&[f32]>>>()?;

    let dim = embeddings.first().map_or(0, |e| e.len());
    if embeddings.iter().any(|e| e.len() != dim) {
        return Err(PipelineError::integrity("embeddings of one scene differ in dimension"));
    }

    let mut centroid = vec![0f64; dim];
    for embedding in &embeddings {
        for (c, x) in centroid.iter_mut().zip(embedding.iter()) {
            *c += *x as f64;
        }
    }
    let count = embeddings.len() as f64;
    centroid.iter_mut().for_each(|c| *c /= count);

    let mut best: Option<(usize, f64)> = None;
    for (i, embedding) in embeddings.iter().enumerate() {
        let distance = embedding
            .iter()
            .zip(&centroid)
            .map(|(x, c)| (*x as f64 - c).powi(2))
            .sum::<f64>();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }

    best.map(|(i, _)| members[i])
        .ok_or_else(|| PipelineError::integrity("scene has no frames"))
}
