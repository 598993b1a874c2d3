//! FFmpeg CLI wrapper and default media capabilities.
//!
//! This crate provides:
//! - FFmpeg command building and blocking execution
//! - FFprobe container inspection
//! - Sequential raw-frame decoding (decode capability)
//! - Clip cutting (encode capability)
//! - Colour-histogram frame embedding (embedding capability)

pub mod command;
pub mod decoder;
pub mod embedding;
pub mod encoder;
pub mod error;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use decoder::{FfmpegDecoder, FrameStream, RawFrame, StreamInfo, VideoDecoder};
pub use embedding::{l2_normalize, FrameEmbedder, HistogramEmbedder};
pub use encoder::{ClipEncoder, EncodingConfig, FfmpegClipEncoder};
pub use error::{MediaError, MediaResult};
pub use probe::{parse_frame_rate, probe_video, VideoInfo};
