use anyhow::Result;
use image::RgbImage;
use ndarray::*;

/// Maps a cropped face image to a fixed-length feature vector.
///
/// Implementations must return an error for a zero-area crop rather than a meaningless vector. Extraction may run on
/// several crops concurrently.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, crop: &RgbImage) -> Result<Array1<f32>>;
}

/// Scale `embedding` to unit L2 norm. Returns `None` for zero-length or non-finite vectors.
pub fn normalize(embedding: ArrayView1<f32>) -> Option<Array1<f32>> {
    let norm = embedding.dot(&embedding).sqrt();
    if norm.is_finite() && norm > 0.0 {
        Some(embedding.mapv(|v| v / norm))
    } else {
        None
    }
}
