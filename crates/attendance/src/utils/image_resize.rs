use anyhow::{anyhow, Result};
use image::RgbImage;
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Interpolation {
  Nearest,
  Bilinear,
  CatmullRom,
  Lanczos3,
}

impl From<Interpolation> for fast_image_resize::ResizeAlg {
  fn from(value: Interpolation) -> Self {
    match value {
      Interpolation::Nearest => fast_image_resize::ResizeAlg::Nearest,
      Interpolation::Bilinear => {
        fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Bilinear)
      }
      Interpolation::CatmullRom => {
        fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::CatmullRom)
      }
      Interpolation::Lanczos3 => {
        fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Lanczos3)
      }
    }
  }
}

/// Resize a face crop to the embedding model's input size.
///
/// When `letterbox` is set the crop keeps its aspect ratio and is centered on a black canvas.
pub fn resize_face(
  face: &RgbImage,
  target_width: u32,
  target_height: u32,
  letterbox: bool,
  interpolation: Interpolation,
) -> Result<RgbImage> {
  let source_width =
    NonZeroU32::new(face.width()).ok_or_else(|| anyhow!("cannot resize a zero-width crop"))?;
  let source_height =
    NonZeroU32::new(face.height()).ok_or_else(|| anyhow!("cannot resize a zero-height crop"))?;
  let target_width =
    NonZeroU32::new(target_width).ok_or_else(|| anyhow!("target width must be positive"))?;
  let target_height =
    NonZeroU32::new(target_height).ok_or_else(|| anyhow!("target height must be positive"))?;

  let mut pixels = face.as_raw().clone();
  let source_image = fast_image_resize::Image::from_slice_u8(
    source_width,
    source_height,
    &mut pixels,
    fast_image_resize::PixelType::U8x3,
  )?;

  let mut target_image =
    fast_image_resize::Image::new(target_width, target_height, source_image.pixel_type());

  let mut dst_view = match letterbox_crop_box(source_width, source_height, target_width, target_height, letterbox) {
    Some(crop_box) => target_image.view_mut().crop(crop_box)?,
    None => target_image.view_mut(),
  };

  let mut resizer = fast_image_resize::Resizer::new(interpolation.into());
  resizer.resize(&source_image.view(), &mut dst_view)?;

  RgbImage::from_vec(target_width.get(), target_height.get(), target_image.into_vec())
    .ok_or_else(|| anyhow!("resized buffer does not match {target_width}x{target_height}"))
}

/// The region of the target the scaled crop occupies, or `None` to stretch over the whole target.
fn letterbox_crop_box(
  source_width: NonZeroU32,
  source_height: NonZeroU32,
  target_width: NonZeroU32,
  target_height: NonZeroU32,
  letterbox: bool,
) -> Option<fast_image_resize::CropBox> {
  let source_width = source_width.get() as f32;
  let source_height = source_height.get() as f32;
  let target_width = target_width.get();
  let target_height = target_height.get();

  if !letterbox || source_width / source_height == target_width as f32 / target_height as f32 {
    return None;
  }

  let scale = (target_width as f32 / source_width).min(target_height as f32 / source_height);
  let scaled_width = ((source_width * scale) as u32).clamp(1, target_width);
  let scaled_height = ((source_height * scale) as u32).clamp(1, target_height);

  Some(fast_image_resize::CropBox {
    left: (target_width - scaled_width) / 2,
    top: (target_height - scaled_height) / 2,
    width: NonZeroU32::new(scaled_width)?,
    height: NonZeroU32::new(scaled_height)?,
  })
}
