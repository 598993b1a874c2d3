//! Sequential raw-frame decoding.
//!
//! The default decoder probes the container with FFprobe, then pipes packed
//! RGB24 frames out of FFmpeg one at a time.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout};

use image::RgbImage;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner, PIPE_OUTPUT};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Stream properties reported when a source is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Native frame rate as reported by the container (may be ~0)
    pub fps: f64,
    /// Total native frame count, 0 when unknown
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

/// One decoded frame in packed RGB24 layout.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Convert into an owned image buffer.
    pub fn into_image(self) -> MediaResult<RgbImage> {
        let (width, height) = (self.width, self.height);
        RgbImage::from_raw(width, height, self.data).ok_or_else(|| {
            MediaError::internal(format!(
                "frame buffer does not match {}x{} RGB24",
                width, height
            ))
        })
    }
}

/// An open, forward-only frame stream.
pub trait FrameStream: Send {
    fn info(&self) -> &StreamInfo;

    /// Next frame in decode order, `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RawFrame>>;
}

/// Decode capability.
pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameStream>>;
}

/// FFmpeg-backed decoder.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder {
    runner: FfmpegRunner,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameStream>> {
        let probe = probe_video(path)?;
        if probe.width == 0 || probe.height == 0 {
            return Err(MediaError::invalid_video(format!(
                "{} has no frame dimensions",
                path.display()
            )));
        }

        let info = StreamInfo {
            fps: probe.fps,
            frame_count: probe.frame_count,
            width: probe.width,
            height: probe.height,
        };

        let cmd = FfmpegCommand::new(path, PIPE_OUTPUT)
            .output_arg("-an")
            .raw_rgb24();
        let mut child = self.runner.spawn_piped(&cmd)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout was not captured"))?;

        debug!(
            path = %path.display(),
            fps = info.fps,
            frame_count = info.frame_count,
            width = info.width,
            height = info.height,
            "Opened video stream"
        );

        Ok(Box::new(FfmpegFrameStream {
            info,
            frame_len: info.width as usize * info.height as usize * 3,
            child,
            stdout,
            finished: false,
        }))
    }
}

struct FfmpegFrameStream {
    info: StreamInfo,
    frame_len: usize,
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl FfmpegFrameStream {
    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg decode exited with non-zero status",
                None,
                status.code(),
            ));
        }
        Ok(())
    }
}

impl FrameStream for FfmpegFrameStream {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => Ok(Some(RawFrame {
                width: self.info.width,
                height: self.info.height,
                data,
            })),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finish()?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop FFmpeg decoder: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}
