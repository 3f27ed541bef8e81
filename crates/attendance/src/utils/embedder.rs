use super::image_resize::{self, Interpolation};
use anyhow::{anyhow, ensure, Context, Result};
use facetrack_rs::{normalize, EmbeddingExtractor};
use image::RgbImage;
use ndarray::Array1;
use std::path::Path;
use tract_onnx::prelude::*;

/// Face embeddings computed by an ONNX model taking a `1x3xHxW` RGB tensor scaled to `[0, 1]`.
pub struct OnnxEmbedder {
  session: TypedRunnableModel<TypedModel>,
  width: u32,
  height: u32,
  interpolation: Interpolation,
}

impl OnnxEmbedder {
  /// Returns a new OnnxEmbedder
  ///
  /// # Parameters
  ///
  /// * `model`: Path of the ONNX model.
  /// * `width`, `height`: The model's input size. Crops are stretched to it.
  /// * `interpolation`: Resize filter applied to crops.
  pub fn new(model: &Path, width: u32, height: u32, interpolation: Interpolation) -> Result<OnnxEmbedder> {
    let session = tract_onnx::onnx()
      .model_for_path(model)
      .with_context(|| format!("failed to load model {}", model.display()))?
      .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())?
      .with_output_fact(0, Default::default())?
      .into_optimized()?
      .into_runnable()?;

    Ok(OnnxEmbedder {
      session,
      width,
      height,
      interpolation,
    })
  }
}

impl EmbeddingExtractor for OnnxEmbedder {
  fn extract(&self, crop: &RgbImage) -> Result<Array1<f32>> {
    ensure!(
      crop.width() > 0 && crop.height() > 0,
      "cannot embed a {}x{} crop",
      crop.width(),
      crop.height()
    );

    let face = image_resize::resize_face(crop, self.width, self.height, false, self.interpolation)?;
    let input: Tensor = tract_ndarray::Array4::from_shape_fn(
      (1, 3, self.height as usize, self.width as usize),
      |(_, c, y, x)| face[(x as _, y as _)][c] as f32 / 255.0,
    )
    .into();

    let outputs = self.session.run(tvec!(input.into()))?;
    let embedding = outputs
      .first()
      .ok_or_else(|| anyhow!("model produced no output"))?
      .to_array_view::<f32>()?
      .iter()
      .copied()
      .collect::<Array1<f32>>();

    normalize(embedding.view()).ok_or_else(|| anyhow!("model produced a zero embedding"))
  }
}
