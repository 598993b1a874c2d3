//! Embedding stage: attach one normalised vector to every sampled frame.

use tracing::{debug, warn};
use vsplice_media::{l2_normalize, FrameEmbedder};
use vsplice_models::FrameRecord;

use crate::error::{Capability, PipelineError, PipelineResult};
use crate::guard::ResourceGuard;
use crate::workspace::RunWorkspace;

/// Embed frames in guard-sized batches.
///
/// Frames are loaded back from the workspace one at a time. Every embedding
/// must have the same dimension.
pub fn embed_frames(
    frames: Vec<FrameRecord>,
    workspace: &RunWorkspace,
    embedder: &dyn FrameEmbedder,
    guard: &ResourceGuard,
) -> PipelineResult<Vec<FrameRecord>> {
    let mut embedded = Vec::with_capacity(frames.len());
    let mut dimension: Option<usize> = None;
    let mut renormalised = 0usize;

    for batch in frames.chunks(guard.batch_size()) {
        for frame in batch {
            let path = workspace.resolve(&frame.identifier);
            let image = image::open(&path)
                .map_err(|e| {
                    PipelineError::capability(
                        Capability::Embed,
                        format!("cannot load {}: {}", frame.identifier, e),
                    )
                })?
                .to_rgb8();

            let mut vector = embedder
                .embed(&image)
                .map_err(|e| PipelineError::from_media(Capability::Embed, e))?;

            if vector.is_empty() || vector.iter().any(|x| !x.is_finite()) {
                return Err(PipelineError::capability(
                    Capability::Embed,
                    format!("invalid embedding for {}", frame.identifier),
                ));
            }
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(PipelineError::capability(
                        Capability::Embed,
                        format!(
                            "embedding dimension changed from {} to {} at {}",
                            d,
                            vector.len(),
                            frame.identifier
                        ),
                    ));
                }
                Some(_) => {}
            }

            let norm = l2_normalize(&mut vector);
            if (norm - 1.0).abs() > 1e-3 {
                renormalised += 1;
            }
            embedded.push(frame.clone().with_embedding(vector));
        }

        debug!(done = embedded.len(), total = frames.len(), "Embedded batch");
        guard.check("embedding")?;
    }

    if renormalised > 0 {
        warn!(
            count = renormalised,
            model = embedder.model_name(),
            "Embedding capability returned unnormalised vectors"
        );
    }

    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use vsplice_media::{MediaResult, HistogramEmbedder};

    struct ScaledEmbedder;

    impl FrameEmbedder for ScaledEmbedder {
        fn model_name(&self) -> &str {
            "scaled"
        }

        fn embed(&self, frame: &RgbImage) -> MediaResult<Vec<f32>> {
            let p = frame.get_pixel(0, 0).0;
            Ok(vec![p[0] as f32 * 3.0, p[2] as f32 * 4.0])
        }
    }

    fn write_frames(ws: &RunWorkspace, colours: &[[u8; 3]]) -> Vec<FrameRecord> {
        colours
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let id = RunWorkspace::frame_identifier(i);
                RgbImage::from_pixel(8, 8, Rgb(*c))
                    .save(ws.resolve(&id))
                    .unwrap();
                FrameRecord::new(i, i as f64 * 2.0, id)
            })
            .collect()
    }

    #[test]
    fn test_embeddings_are_normalised() {
        let tmp = TempDir::new().unwrap();
        let ws = RunWorkspace::create(tmp.path(), None).unwrap();
        let frames = write_frames(&ws, &[[100, 0, 100], [100, 0, 100]]);
        let guard = ResourceGuard::disabled(GuardConfig::default());

        let out = embed_frames(frames, &ws, &ScaledEmbedder, &guard).unwrap();
        assert_eq!(out.len(), 2);
        for frame in &out {
            let v = frame.embedding().unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_order_and_indices_preserved() {
        let tmp = TempDir::new().unwrap();
        let ws = RunWorkspace::create(tmp.path(), None).unwrap();
        let frames = write_frames(&ws, &[[255, 0, 0], [0, 255, 0], [0, 0, 255], [9, 9, 9]]);
        let guard = ResourceGuard::disabled(GuardConfig::default());

        let out = embed_frames(frames, &ws, &HistogramEmbedder::default(), &guard).unwrap();
        let indices: Vec<usize> = out.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(out.iter().all(|f| f.embedding().map(<[f32]>::len) == Some(512)));
    }

    #[test]
    fn test_missing_frame_file_is_capability_error() {
        let tmp = TempDir::new().unwrap();
        let ws = RunWorkspace::create(tmp.path(), None).unwrap();
        let frames = vec![FrameRecord::new(0, 0.0, RunWorkspace::frame_identifier(0))];
        let guard = ResourceGuard::disabled(GuardConfig::default());

        let err = embed_frames(frames, &ws, &ScaledEmbedder, &guard).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Capability {
                capability: Capability::Embed,
                ..
            }
        ));
    }
}
