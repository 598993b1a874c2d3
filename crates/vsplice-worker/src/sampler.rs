//! Frame sampling.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use tracing::{debug, info, warn};
use vsplice_media::{RawFrame, VideoDecoder};
use vsplice_models::{FrameRecord, VideoProps};

use crate::error::{Capability, PipelineError, PipelineResult};
use crate::guard::ResourceGuard;
use crate::workspace::RunWorkspace;

/// Native frame rates below this are treated as unreported.
const MIN_PLAUSIBLE_FPS: f64 = 1e-3;

const JPEG_QUALITY: u8 = 90;

/// Result of sampling one source.
#[derive(Debug, Clone)]
pub struct SampledVideo {
    pub props: VideoProps,
    pub frames: Vec<FrameRecord>,
}

/// Check that the source is an existing, non-empty regular file within the size limit.
pub fn validate_source(source: &Path, max_bytes: u64) -> PipelineResult<u64> {
    let meta = std::fs::metadata(source).map_err(|e| {
        PipelineError::input(format!("cannot read {}: {}", source.display(), e))
    })?;

    if !meta.is_file() {
        return Err(PipelineError::input(format!(
            "{} is not a regular file",
            source.display()
        )));
    }
    if meta.len() == 0 {
        return Err(PipelineError::input(format!("{} is empty", source.display())));
    }
    if meta.len() > max_bytes {
        return Err(PipelineError::input(format!(
            "{} is {} bytes, larger than the {} byte limit",
            source.display(),
            meta.len(),
            max_bytes
        )));
    }
    Ok(meta.len())
}

/// Native fps to use, substituting `fallback` for near-zero or non-finite rates.
pub fn effective_fps(reported: f64, fallback: f64) -> f64 {
    if reported.is_finite() && reported >= MIN_PLAUSIBLE_FPS {
        reported
    } else {
        fallback
    }
}

/// Sampling step in native frames: `max(round(fps / target_rate), 1)`.
pub fn sampling_step(native_fps: f64, target_rate: f64) -> usize {
    if !(target_rate.is_finite() && target_rate > 0.0) {
        return 1;
    }
    let step = (native_fps / target_rate).round();
    if step.is_finite() && step >= 1.0 {
        step as usize
    } else {
        1
    }
}

/// Keeps every n-th decoded frame and persists it to the workspace.
pub struct FrameSampler<'a> {
    decoder: &'a dyn VideoDecoder,
    guard: &'a ResourceGuard,
    frame_rate: f64,
    fps_fallback: f64,
}

impl<'a> FrameSampler<'a> {
    pub fn new(
        decoder: &'a dyn VideoDecoder,
        guard: &'a ResourceGuard,
        frame_rate: f64,
        fps_fallback: f64,
    ) -> Self {
        Self {
            decoder,
            guard,
            frame_rate,
            fps_fallback,
        }
    }

    /// Decode `source` sequentially and keep frames at the target rate.
    ///
    /// Frames are written as `frames/frame_{index:06}.jpg`.
    pub fn sample(&self, source: &Path, workspace: &RunWorkspace) -> PipelineResult<SampledVideo> {
        let mut stream = self
            .decoder
            .open(source)
            .map_err(|e| PipelineError::from_media(Capability::Decode, e))?;

        let info = *stream.info();
        let fps = effective_fps(info.fps, self.fps_fallback);
        if fps != info.fps {
            warn!(
                reported_fps = info.fps,
                fallback_fps = fps,
                "Container reported no usable frame rate, using fallback"
            );
        }

        let props = VideoProps::new(
            source.to_string_lossy(),
            fps,
            info.frame_count,
            info.width,
            info.height,
        );
        let step = sampling_step(fps, self.frame_rate);
        info!(
            fps,
            frame_count = info.frame_count,
            step,
            target_rate = self.frame_rate,
            "Sampling frames"
        );

        let batch_size = self.guard.batch_size();
        let mut frames = Vec::new();
        let mut native_idx: usize = 0;

        while let Some(raw) = stream
            .next_frame()
            .map_err(|e| PipelineError::from_media(Capability::Decode, e))?
        {
            if native_idx % step == 0 {
                let index = frames.len();
                let identifier = RunWorkspace::frame_identifier(index);
                save_jpeg(raw, &workspace.resolve(&identifier))?;

                let timestamp = native_idx as f64 / fps;
                debug!(index, native_idx, timestamp, "Kept frame");
                frames.push(FrameRecord::new(index, timestamp, identifier));

                if frames.len() % batch_size == 0 {
                    self.guard.check("sampling")?;
                }
            }
            native_idx += 1;
        }

        info!(
            decoded = native_idx,
            kept = frames.len(),
            "Sampling complete"
        );
        Ok(SampledVideo { props, frames })
    }
}

fn save_jpeg(raw: RawFrame, path: &Path) -> PipelineResult<()> {
    let image = raw
        .into_image()
        .map_err(|e| PipelineError::from_media(Capability::Decode, e))?;
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| PipelineError::capability(Capability::Decode, format!("JPEG encode failed: {}", e)))?;
    Ok(())
}
