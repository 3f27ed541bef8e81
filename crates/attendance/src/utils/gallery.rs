use anyhow::{Context, Result};
use facetrack_rs::{EmbeddingExtractor, Gallery};
use std::path::Path;
use tracing::{debug, info};

/// Build the gallery from a directory of reference faces.
///
/// Each `<name>.npy` file holds a precomputed embedding. Each `<name>.jpg`, `.jpeg` or `.png` file is a cropped face
/// embedded with `extractor`. Entries are ordered by file name.
pub fn load_gallery(dir: &Path, extractor: &dyn EmbeddingExtractor) -> Result<Gallery> {
  let mut paths = std::fs::read_dir(dir)
    .with_context(|| format!("failed to read gallery {}", dir.display()))?
    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
    .filter(|path| path.is_file())
    .collect::<Vec<_>>();
  paths.sort();

  let mut entries = Vec::with_capacity(paths.len());
  for path in paths {
    let (Some(name), Some(extension)) = (
      path.file_stem().map(|stem| stem.to_string_lossy().to_string()),
      path.extension().map(|ext| ext.to_string_lossy().to_lowercase()),
    ) else {
      continue;
    };

    let embedding = match extension.as_str() {
      "npy" => {
        let bytes = std::fs::read(&path)?;
        npyz::NpyFile::new(&bytes[..])
          .and_then(|npy| npy.into_vec::<f32>())
          .with_context(|| format!("invalid embedding {}", path.display()))?
      }
      "jpg" | "jpeg" | "png" => {
        let face = image::open(&path)
          .with_context(|| format!("invalid reference image {}", path.display()))?
          .to_rgb8();
        extractor
          .extract(&face)
          .with_context(|| format!("failed to embed {}", path.display()))?
          .to_vec()
      }
      _ => {
        debug!(path = %path.display(), "skipping gallery file");
        continue;
      }
    };

    debug!(name = %name, dimension = embedding.len(), "gallery entry loaded");
    entries.push((name, embedding));
  }

  let gallery = Gallery::new(entries).context("invalid gallery")?;
  info!(identities = gallery.len(), names = ?gallery.names(), "gallery loaded");
  Ok(gallery)
}

#[cfg(test)]
mod tests {
  use super::*;
  use anyhow::ensure;
  use image::{Rgb, RgbImage};
  use ndarray::Array1;

  struct MeanColour;

  impl EmbeddingExtractor for MeanColour {
    fn extract(&self, crop: &RgbImage) -> Result<Array1<f32>> {
      ensure!(crop.width() > 0 && crop.height() > 0, "empty crop");
      let pixel = crop.get_pixel(0, 0);
      Ok(Array1::from_iter(pixel.0.iter().map(|&v| v as f32)))
    }
  }

  /// A version 1.0 `.npy` file holding a little-endian f32 vector.
  fn npy(values: &[f32]) -> Vec<u8> {
    let mut header = format!(
      "{{'descr': '<f4', 'fortran_order': False, 'shape': ({},), }}",
      values.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
      header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in values {
      bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
  }

  #[test]
  fn loads_embeddings_and_images() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("bob.npy"), npy(&[0.0, 3.0, 4.0]))?;
    RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])).save(dir.path().join("alice.png"))?;
    std::fs::write(dir.path().join("notes.txt"), "ignored")?;

    let gallery = load_gallery(dir.path(), &MeanColour)?;
    assert_eq!(gallery.names(), &["alice".to_string(), "bob".to_string()]);
    assert_eq!(gallery.dimension(), 3);
    Ok(())
  }

  #[test]
  fn rejects_mismatched_dimensions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("alice.npy"), npy(&[1.0, 0.0]))?;
    std::fs::write(dir.path().join("bob.npy"), npy(&[0.0, 3.0, 4.0]))?;

    assert!(load_gallery(dir.path(), &MeanColour).is_err());
    Ok(())
  }

  #[test]
  fn empty_directory_gives_empty_gallery() -> Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(load_gallery(dir.path(), &MeanColour)?.is_empty());
    Ok(())
  }
}
