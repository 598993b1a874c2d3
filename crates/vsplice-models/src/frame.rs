//! Sampled frame records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A frame kept by the sampler.
///
/// `index` is contiguous and 0-based in emission order. `timestamp` is derived
/// from the frame's native decode position, so it is monotonically
/// non-decreasing across a sampling run. The embedding is attached exactly
/// once, after sampling, and the record is not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRecord {
    /// Position in the sampled sequence
    pub index: usize,
    /// Seconds from the start of the source
    pub timestamp: f64,
    /// Workspace-relative path of the stored pixel buffer
    pub identifier: String,
    /// Fixed-dimension embedding vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl FrameRecord {
    /// Create a frame record without an embedding.
    pub fn new(index: usize, timestamp: f64, identifier: impl Into<String>) -> Self {
        Self {
            index,
            timestamp,
            identifier: identifier.into(),
            embedding: None,
        }
    }

    /// Consume the record and return it with the embedding attached.
    pub fn with_embedding(self, embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..self
        }
    }

    /// Embedding slice, if one has been attached.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_embedding() {
        let frame = FrameRecord::new(3, 6.0, "frames/frame_000003.jpg");
        assert!(frame.embedding().is_none());

        let frame = frame.with_embedding(vec![0.6, 0.8]);
        assert_eq!(frame.index, 3);
        assert_eq!(frame.embedding(), Some(&[0.6, 0.8][..]));
    }

    #[test]
    fn test_embedding_omitted_when_absent() {
        let frame = FrameRecord::new(0, 0.0, "frames/frame_000000.jpg");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("embedding"));
    }
}
