//! Clip cutting.

use std::path::Path;

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Encoding configuration for cut clips.
#[derive(Debug, Clone)]
pub struct EncodingConfig {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Encode capability: cut `[start, end)` of `source` into an independent file.
pub trait ClipEncoder: Send + Sync {
    fn cut(&self, source: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed clip encoder.
#[derive(Debug, Clone, Default)]
pub struct FfmpegClipEncoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl FfmpegClipEncoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            encoding,
        }
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    fn build_command(&self, source: &Path, start: f64, end: f64, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .seek(start)
            .duration(end - start)
            .video_codec(&self.encoding.codec)
            .preset(&self.encoding.preset)
            .crf(self.encoding.crf)
            .audio_codec(&self.encoding.audio_codec)
            .audio_bitrate(&self.encoding.audio_bitrate)
            .output_args(["-movflags", "+faststart"])
    }
}

impl ClipEncoder for FfmpegClipEncoder {
    fn cut(&self, source: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()> {
        if !(start >= 0.0 && end > start) {
            return Err(MediaError::InvalidRange { start, end });
        }
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }

        info!(
            "Cutting clip: {:.2}s-{:.2}s -> {}",
            start,
            end,
            output.display()
        );

        let cmd = self.build_command(source, start, end, output);
        self.runner.run(&cmd)?;

        let written = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(MediaError::ffmpeg_failed(
                "Output file was not created or is empty",
                None,
                None,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_range() {
        let encoder = FfmpegClipEncoder::default();
        let err = encoder
            .cut(Path::new("in.mp4"), 10.0, 5.0, Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidRange { .. }));
    }

    #[test]
    fn test_command_uses_duration_not_end() {
        let encoder = FfmpegClipEncoder::default();
        let args = encoder
            .build_command(Path::new("in.mp4"), 240.0, 480.0, Path::new("clip_000_1.mp4"))
            .build_args();

        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "240.000");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"aac".to_string()));
    }
}
