//! Source video properties.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Basic, immutable properties of a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoProps {
    /// Source path as given to the decoder
    pub path: String,
    /// Duration in seconds (`frame_count / fps`, 0 when the frame count is unknown)
    pub duration: f64,
    /// Native frame rate after any fallback substitution
    pub fps: f64,
    /// Total native frame count as reported by the container
    pub frame_count: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoProps {
    /// Build properties from raw container values.
    ///
    /// `fps` must already be sanitized by the caller.
    pub fn new(path: impl Into<String>, fps: f64, frame_count: u64, width: u32, height: u32) -> Self {
        let duration = if frame_count > 0 && fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };

        Self {
            path: path.into(),
            duration,
            fps,
            frame_count,
            width,
            height,
        }
    }
}
