use anyhow::{anyhow, Context, Result};
use facetrack_rs::{AttendanceRecord, FrameReport, Identity};
use image::Rgb;
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

/// Appends every frame's tracks to a MOT Challenge result file.
pub struct TrackWriter {
  file: BufWriter<File>,
}

impl TrackWriter {
  pub fn create(path: &Path) -> Result<TrackWriter> {
    let file =
      File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(TrackWriter {
      file: BufWriter::new(file),
    })
  }

  pub fn write(&mut self, report: &FrameReport) -> Result<()> {
    for track in &report.tracks {
      // <frame>, <id>, <bb_left>, <bb_top>, <bb_width>, <bb_height>, <conf>, <x>, <y>, <z>
      writeln!(
        self.file,
        "{},{},{:.3},{:.3},{:.3},{:.3},1,-1,-1,-1",
        report.frame_index,
        track.track_id,
        track.bbox.x(),
        track.bbox.y(),
        track.bbox.width(),
        track.bbox.height()
      )?;
    }
    Ok(())
  }

  pub fn finish(mut self) -> Result<()> {
    Ok(self.file.flush()?)
  }
}

/// Write the attendance registry as `name,first_seen` rows.
pub fn write_attendance(path: &Path, records: &[AttendanceRecord]) -> Result<()> {
  let mut writer =
    csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
  for record in records {
    writer.serialize(record)?;
  }
  Ok(writer.flush()?)
}

/// Draws every track onto a copy of its frame: green for confirmed identities, yellow otherwise.
pub struct Annotator {
  dir: PathBuf,
  font: Option<Font<'static>>,
}

impl Annotator {
  /// Returns a new Annotator
  ///
  /// # Parameters
  ///
  /// * `dir`: Output directory, created if missing.
  /// * `font`: A TrueType font used to label boxes. Boxes are left unlabelled without one.
  pub fn new(dir: PathBuf, font: Option<&Path>) -> Result<Annotator> {
    std::fs::create_dir_all(&dir)?;
    let font = match font {
      Some(path) => {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Some(Font::try_from_vec(bytes).ok_or_else(|| anyhow!("invalid font {}", path.display()))?)
      }
      None => None,
    };
    Ok(Annotator { dir, font })
  }

  pub fn annotate(&self, frame_path: &Path, report: &FrameReport) -> Result<PathBuf> {
    let mut frame = image::open(frame_path)?.to_rgb8();

    for track in &report.tracks {
      let color = match (&track.name, track.confirmed) {
        (Identity::Known(_), true) => Rgb([0u8, 255u8, 0u8]),
        _ => Rgb([255u8, 255u8, 0u8]),
      };

      imageproc::drawing::draw_hollow_rect_mut(
        &mut frame,
        Rect::at(track.bbox.x() as i32, track.bbox.y() as i32)
          .of_size(track.bbox.width().max(1.0) as u32, track.bbox.height().max(1.0) as u32),
        color,
      );

      if let Some(font) = &self.font {
        imageproc::drawing::draw_text_mut(
          &mut frame,
          color,
          track.bbox.x() as i32,
          (track.bbox.y() as i32 - 22).max(0),
          Scale { x: 20.0, y: 20.0 },
          font,
          &format!("{} {}", track.track_id, track.name),
        );
      }
    }

    let file_name = frame_path
      .file_name()
      .ok_or_else(|| anyhow!("frame path {} has no file name", frame_path.display()))?;
    let output = self.dir.join(file_name);
    frame.save(&output)?;
    Ok(output)
  }
}
