//! Frame embedding.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// Embedding capability: one fixed-length vector per frame.
pub trait FrameEmbedder: Send + Sync {
    /// Label recorded in run metadata.
    fn model_name(&self) -> &str;

    fn embed(&self, frame: &RgbImage) -> MediaResult<Vec<f32>>;
}

/// Joint RGB colour histogram.
///
/// Each channel is quantised into `bins` levels, giving `bins³` dimensions.
/// The histogram is L2-normalised so cosine similarity is a dot product.
#[derive(Debug, Clone)]
pub struct HistogramEmbedder {
    name: String,
    bins: u32,
    /// Sample every n-th pixel along each axis
    stride: u32,
}

impl HistogramEmbedder {
    pub const DEFAULT_BINS: u32 = 8;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bins: Self::DEFAULT_BINS,
            stride: 4,
        }
    }

    pub fn with_bins(mut self, bins: u32) -> Self {
        self.bins = bins.clamp(1, 64);
        self
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride.max(1);
        self
    }

    pub fn dimensions(&self) -> usize {
        (self.bins * self.bins * self.bins) as usize
    }

    fn bin(&self, value: u8) -> usize {
        (value as u32 * self.bins / 256) as usize
    }
}

impl Default for HistogramEmbedder {
    fn default() -> Self {
        Self::new("rgb-histogram-512")
    }
}

impl FrameEmbedder for HistogramEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn embed(&self, frame: &RgbImage) -> MediaResult<Vec<f32>> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(MediaError::embedding_failed("empty frame"));
        }

        let bins = self.bins as usize;
        let mut hist = vec![0f32; self.dimensions()];
        for y in (0..height).step_by(self.stride as usize) {
            for x in (0..width).step_by(self.stride as usize) {
                let [r, g, b] = frame.get_pixel(x, y).0;
                let idx = (self.bin(r) * bins + self.bin(g)) * bins + self.bin(b);
                hist[idx] += 1.0;
            }
        }

        l2_normalize(&mut hist);
        Ok(hist)
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
///
/// Returns the original norm.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}
