mod utils;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use facetrack_rs::*;
use std::{fs::File, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utils::{
    embedder::OnnxEmbedder,
    gallery::load_gallery,
    image_resize::Interpolation,
    output::{write_attendance, Annotator, TrackWriter},
    sources::{ImageSequence, MotDetections},
    template_tracker::TemplatePredictor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Predictor {
    /// Search for the spawn-time face template around the previous box
    Template,
    /// Coast the spawn box with a constant velocity Kalman filter
    Kalman,
}

/// Track faces through an image sequence and record who was present
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Glob matching the frame images, processed in sorted order
    #[arg(short, long)]
    input: String,

    /// Face detections in MOT Challenge format (frame,id,x,y,w,h,conf,...)
    #[arg(short, long)]
    detections: PathBuf,

    /// Directory of reference faces: <name>.npy embeddings or <name>.jpg|png crops
    #[arg(short, long)]
    gallery: PathBuf,

    /// ONNX face embedding model
    #[arg(short, long)]
    model: PathBuf,

    /// Square input size of the embedding model
    #[arg(long, default_value_t = 224)]
    input_size: u32,

    /// Filter used to resize face crops
    #[arg(long, value_enum, default_value_t = Interpolation::Bilinear)]
    interpolation: Interpolation,

    /// Frame rate of the sequence, used to timestamp frames
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Timestamp of the first frame (RFC 3339). Defaults to now
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Tracker configuration as JSON. Flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum cosine distance for a gallery match
    #[arg(long)]
    cosine_threshold: Option<f32>,

    /// Minimum detector confidence
    #[arg(long)]
    confidence_threshold: Option<f32>,

    /// Minimum face width and height in pixels
    #[arg(long)]
    min_face_size: Option<f32>,

    /// Run the detector every N frames
    #[arg(long)]
    detect_interval: Option<usize>,

    /// Drop a track after N consecutive lost frames
    #[arg(long)]
    max_missed_frames: Option<usize>,

    /// Recompute track embeddings every N frames
    #[arg(long)]
    embedding_refresh_interval: Option<usize>,

    /// Consecutive identical identities required to confirm a track
    #[arg(long)]
    smoothing_window: Option<usize>,

    /// Overlap above which a detection belongs to an existing track
    #[arg(long)]
    duplicate_iou_threshold: Option<f32>,

    /// Overlap below which a track no longer matches any detection
    #[arg(long)]
    remove_iou_threshold: Option<f32>,

    /// Drop a track displayed as unknown for N detection cycles
    #[arg(long)]
    unknown_drop_frames: Option<usize>,

    /// Resolve identities on every frame rather than on detection cycles
    #[arg(long, default_value_t = false)]
    every_frame: bool,

    /// Keep all tracks when a detection cycle finds no faces
    #[arg(long, default_value_t = false)]
    retain_on_empty: bool,

    /// Motion predictor used between detection cycles
    #[arg(long, value_enum, default_value_t = Predictor::Template)]
    predictor: Predictor,

    /// Stop after N frames
    #[arg(long)]
    max_frames: Option<usize>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Write annotated frames
    #[arg(short, long, default_value_t = false)]
    write_images: bool,

    /// TrueType font used to label annotated frames
    #[arg(long)]
    font: Option<PathBuf>,
}

impl Args {
    fn tracker_config(&self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
                serde_json::from_reader(file).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => TrackerConfig::default(),
        };

        if let Some(value) = self.cosine_threshold {
            config.with_cosine_threshold(value);
        }
        if let Some(value) = self.confidence_threshold {
            config.with_confidence_threshold(value);
        }
        if let Some(value) = self.min_face_size {
            config.with_min_face_size(value);
        }
        if let Some(value) = self.detect_interval {
            config.with_detect_interval(value);
        }
        if let Some(value) = self.max_missed_frames {
            config.with_max_missed_frames(value);
        }
        if let Some(value) = self.embedding_refresh_interval {
            config.with_embedding_refresh_interval(value);
        }
        if let Some(value) = self.smoothing_window {
            config.with_smoothing_window(value);
        }
        if let Some(value) = self.duplicate_iou_threshold {
            config.with_duplicate_iou_threshold(value);
        }
        if let Some(value) = self.remove_iou_threshold {
            config.with_remove_iou_threshold(value);
        }
        if let Some(value) = self.unknown_drop_frames {
            config.with_unknown_drop_frames(value);
        }
        if self.every_frame {
            config.with_cadence(RecognitionCadence::EveryFrame);
        }
        if self.retain_on_empty {
            config.with_empty_detections(EmptyDetectionPolicy::RetainTracks);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.tracker_config()?;

    let embedder = OnnxEmbedder::new(&args.model, args.input_size, args.input_size, args.interpolation)?;
    let gallery = load_gallery(&args.gallery, &embedder)?;

    let mut paths = ImageSequence::glob(&args.input)?;
    if let Some(max_frames) = args.max_frames {
        paths.truncate(max_frames);
    }
    info!(frames = paths.len(), input = %args.input, "frames found");

    let sequence = ImageSequence::new(paths, args.start.unwrap_or_else(Utc::now), args.fps)?;
    let paths = sequence.paths().to_vec();
    let detector = MotDetections::from_path(&args.detections, sequence.cursor())?;

    let predictor_factory = match args.predictor {
        Predictor::Template => TemplatePredictor::factory(None, None),
        Predictor::Kalman => KalmanPredictor::factory(None),
    };
    let tracker = Tracker::new(config, gallery, Box::new(embedder), predictor_factory)?;
    let mut driver = FrameDriver::new(sequence, detector, tracker);

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut writer = TrackWriter::create(&args.output.join("tracks.txt"))?;
    let annotator = if args.write_images {
        Some(Annotator::new(args.output.join("frames"), args.font.as_deref())?)
    } else {
        None
    };

    // output failures stop the loop at the next frame boundary
    let stop = driver.stop_handle();
    let mut failure = None;
    driver.run(|report| {
        let result = writer.write(report).and_then(|()| match &annotator {
            Some(annotator) => annotator
                .annotate(&paths[report.frame_index as usize - 1], report)
                .map(|_| ()),
            None => Ok(()),
        });

        if let Err(err) = result {
            error!(frame = report.frame_index, error = %err, "failed to write output");
            failure.get_or_insert(err);
            stop.stop();
        }
    })?;

    if let Some(err) = failure {
        return Err(err);
    }
    writer.finish()?;

    let records = driver.tracker().attendance().records();
    write_attendance(&args.output.join("attendance.csv"), &records)?;
    for record in &records {
        info!(name = %record.name, first_seen = %record.first_seen, "present");
    }

    Ok(())
}
