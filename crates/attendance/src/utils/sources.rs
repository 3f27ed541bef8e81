use anyhow::{anyhow, ensure, Context, Result};
use chrono::{DateTime, Duration, Utc};
use facetrack_rs::{BoundingBox, Detection, Detector, Frame, FrameSource};
use image::RgbImage;
use indexmap::IndexMap;
use serde::Deserialize;
use std::{
  cell::Cell,
  path::{Path, PathBuf},
  rc::Rc,
};
use tracing::{debug, warn};

/// The index of the frame most recently handed out by an `ImageSequence`.
#[derive(Debug, Clone, Default)]
pub struct FrameCursor(Rc<Cell<u64>>);

impl FrameCursor {
  pub fn get(&self) -> u64 {
    self.0.get()
  }

  fn set(&self, index: u64) {
    self.0.set(index)
  }
}

/// Frames read from a sorted list of image files. Frame indices are 1-based.
pub struct ImageSequence {
  paths: Vec<PathBuf>,
  position: usize,
  start: DateTime<Utc>,
  frame_interval: Duration,
  cursor: FrameCursor,
}

impl ImageSequence {
  /// Returns a new ImageSequence
  ///
  /// # Parameters
  ///
  /// * `paths`: The frame images, in playback order.
  /// * `start`: Timestamp of the first frame.
  /// * `fps`: Playback rate used to derive the timestamp of every later frame. Must be positive and leave every frame
  ///   timestamp representable.
  pub fn new(paths: Vec<PathBuf>, start: DateTime<Utc>, fps: f64) -> Result<ImageSequence> {
    ensure!(fps.is_finite() && fps > 0.0, "fps must be positive, got {fps}");
    let frame_interval = Duration::microseconds((1_000_000.0 / fps).round() as i64);
    ensure!(frame_interval > Duration::zero(), "fps {fps} is too high");

    // the last frame must still have a timestamp
    i32::try_from(paths.len())
      .ok()
      .and_then(|frames| frame_interval.checked_mul(frames))
      .and_then(|span| start.checked_add_signed(span))
      .ok_or_else(|| anyhow!("fps {fps} is too low for {} frames", paths.len()))?;

    Ok(ImageSequence {
      paths,
      position: 0,
      start,
      frame_interval,
      cursor: FrameCursor::default(),
    })
  }

  /// Returns every file matching `pattern`, sorted by path
  pub fn glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = glob::glob(pattern)
      .with_context(|| format!("invalid input pattern {pattern}"))?
      .filter_map(|path| path.ok())
      .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
  }

  pub fn cursor(&self) -> FrameCursor {
    self.cursor.clone()
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }
}

impl FrameSource for ImageSequence {
  fn next_frame(&mut self) -> Option<Frame> {
    let path = self.paths.get(self.position)?;
    let image = match image::open(path) {
      Ok(image) => image.to_rgb8(),
      Err(err) => {
        warn!(path = %path.display(), error = %err, "unreadable frame, ending stream");
        return None;
      }
    };

    self.position += 1;
    let index = self.position as u64;
    self.cursor.set(index);

    Some(Frame::new(
      index,
      self.start + self.frame_interval * (index as i32 - 1),
      image,
    ))
  }
}

/// One row of a MOT Challenge detection file.
#[derive(Debug, Deserialize)]
struct MotRow {
  frame: u64,
  _id: f32,
  x: f32,
  y: f32,
  width: f32,
  height: f32,
  confidence: f32,
}

/// Replays detections precomputed in the MOT Challenge format (`frame,id,x,y,w,h,conf,...`).
///
/// The detector sees only the image, so it follows the frame sequence through a shared `FrameCursor`.
pub struct MotDetections {
  detections: IndexMap<u64, Vec<Detection>>,
  cursor: FrameCursor,
}

impl MotDetections {
  pub fn from_path(path: &Path, cursor: FrameCursor) -> Result<MotDetections> {
    let reader = csv::ReaderBuilder::new()
      .has_headers(false)
      .flexible(true)
      .trim(csv::Trim::All)
      .from_path(path)
      .with_context(|| format!("failed to open detections {}", path.display()))?;
    MotDetections::from_reader(reader, cursor)
  }

  pub fn from_reader<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    cursor: FrameCursor,
  ) -> Result<MotDetections> {
    let mut detections = IndexMap::<u64, Vec<Detection>>::new();
    for (line, record) in reader.records().enumerate() {
      let record = record.with_context(|| format!("invalid detection on line {}", line + 1))?;
      // trailing world coordinates are ignored
      let row: MotRow = record
        .iter()
        .take(7)
        .collect::<csv::StringRecord>()
        .deserialize(None)
        .with_context(|| format!("invalid detection on line {}", line + 1))?;

      detections
        .entry(row.frame)
        .or_default()
        .push(Detection::new(
          BoundingBox::new(row.x, row.y, row.width, row.height),
          row.confidence,
        ));
    }

    debug!(frames = detections.len(), "detections loaded");
    Ok(MotDetections { detections, cursor })
  }
}

impl Detector for MotDetections {
  fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
    Ok(
      self
        .detections
        .get(&self.cursor.get())
        .cloned()
        .unwrap_or_default(),
    )
  }
}
