use anyhow::{anyhow, bail, Result};
use facetrack_rs::{BoundingBox, MotionPredictor, PredictorFactory};
use image::{imageops, GrayImage, RgbImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

/// Longest side of the stored template, in pixels.
const TEMPLATE_SIZE: f32 = 24.0;

/// A visual motion predictor: the face at spawn time is kept as a downscaled grayscale template and searched for in a
/// window around the previous box.
pub struct TemplatePredictor {
  template: Option<GrayImage>,
  bbox: BoundingBox,
  /// Template pixels per image pixel.
  scale: f32,
  /// Search margin around the previous box, as a fraction of its size.
  search: f32,
  /// Minimum normalized cross correlation accepted as a match.
  min_score: f32,
}

impl TemplatePredictor {
  /// Returns a new TemplatePredictor
  ///
  /// # Parameters
  ///
  /// * `search`: Search margin as a fraction of the box size. Default `0.5`.
  /// * `min_score`: Match score below which the target is lost. Default `0.8`.
  pub fn new(search: Option<f32>, min_score: Option<f32>) -> TemplatePredictor {
    TemplatePredictor {
      template: None,
      bbox: BoundingBox::new(0.0, 0.0, 0.0, 0.0),
      scale: 1.0,
      search: search.unwrap_or(0.5),
      min_score: min_score.unwrap_or(0.8),
    }
  }

  pub fn factory(search: Option<f32>, min_score: Option<f32>) -> PredictorFactory {
    Box::new(move || Box::new(TemplatePredictor::new(search, min_score)))
  }

  /// Crop `bbox` from `image` as a grayscale image at the template scale.
  fn sample(&self, image: &RgbImage, bbox: &BoundingBox) -> Option<GrayImage> {
    let bbox = bbox.clamp(image.width(), image.height())?;
    let (x, y) = (bbox.x() as u32, bbox.y() as u32);
    let width = (bbox.width() as u32).min(image.width() - x);
    let height = (bbox.height() as u32).min(image.height() - y);
    if width == 0 || height == 0 {
      return None;
    }

    let region = imageops::crop_imm(image, x, y, width, height).to_image();
    let scaled_width = ((width as f32 * self.scale).round() as u32).max(1);
    let scaled_height = ((height as f32 * self.scale).round() as u32).max(1);
    Some(imageops::resize(
      &imageops::grayscale(&region),
      scaled_width,
      scaled_height,
      imageops::FilterType::Triangle,
    ))
  }
}

impl MotionPredictor for TemplatePredictor {
  fn init(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<()> {
    if bbox.is_empty() {
      bail!("cannot follow an empty box {:?}", bbox);
    }

    self.scale = (TEMPLATE_SIZE / bbox.width().max(bbox.height())).min(1.0);
    self.bbox = *bbox;
    self.template = Some(
      self
        .sample(image, bbox)
        .ok_or_else(|| anyhow!("box {:?} lies outside the frame", bbox))?,
    );
    Ok(())
  }

  fn update(&mut self, image: &RgbImage) -> Result<BoundingBox> {
    let template = self
      .template
      .as_ref()
      .ok_or_else(|| anyhow!("predictor was never initialized"))?;

    let margin_x = self.bbox.width() * self.search;
    let margin_y = self.bbox.height() * self.search;
    let window = BoundingBox::new(
      self.bbox.x() - margin_x,
      self.bbox.y() - margin_y,
      self.bbox.width() + 2.0 * margin_x,
      self.bbox.height() + 2.0 * margin_y,
    )
    .clamp(image.width(), image.height())
    .ok_or_else(|| anyhow!("search window left the frame"))?;

    let area = self
      .sample(image, &window)
      .ok_or_else(|| anyhow!("search window left the frame"))?;
    if area.width() < template.width() || area.height() < template.height() {
      bail!("search window is smaller than the template");
    }

    let scores = match_template(&area, template, MatchTemplateMethod::CrossCorrelationNormalized);
    let extremes = find_extremes(&scores);
    // a blank template or window scores NaN
    if extremes.max_value.is_nan() || extremes.max_value < self.min_score {
      bail!("target lost: best match {:.2}", extremes.max_value);
    }

    let (dx, dy) = extremes.max_value_location;
    self.bbox = BoundingBox::new(
      window.x().floor() + dx as f32 / self.scale,
      window.y().floor() + dy as f32 / self.scale,
      self.bbox.width(),
      self.bbox.height(),
    );
    Ok(self.bbox)
  }
}
