use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// When the recognition smoother observes a track's resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionCadence {
    /// Once per detection cycle, so `smoothing_window` counts detection cycles.
    #[default]
    DetectionCycle,
    /// On every frame where the track's motion predictor succeeds.
    EveryFrame,
}

/// What a detection cycle does with existing tracks when the detector finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDetectionPolicy {
    /// Nothing is visible: every track fails the removal IoU test and is evicted.
    #[default]
    EvictAll,
    /// Skip pruning for this cycle and keep every track.
    RetainTracks,
}

/// Thresholds and intervals for the tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum cosine distance for a gallery match. Default `0.63`.
    pub cosine_threshold: f32,
    /// Minimum detector confidence. Default `0.95`.
    pub confidence_threshold: f32,
    /// Minimum width and height (pixels) of a clamped detection. Default `40`.
    pub min_face_size: f32,
    /// Run the detector every n frames. Default `5`.
    pub detect_interval: usize,
    /// Evict a track after this many consecutive motion predictor failures. Default `10`.
    pub max_missed_frames: usize,
    /// Recompute track embeddings every n frames. Default `10`.
    pub embedding_refresh_interval: usize,
    /// Consecutive identical candidates before a candidate is promoted. Default `3`.
    pub smoothing_window: usize,
    /// A detection overlapping a track by more than this is not spawned. Default `0.3`.
    pub duplicate_iou_threshold: f32,
    /// A track overlapping every detection by less than this is evicted. Default `0.20`.
    pub remove_iou_threshold: f32,
    /// Evict a track displayed as unknown for this many consecutive detection cycles. Default `3`.
    pub unknown_drop_frames: usize,
    pub cadence: RecognitionCadence,
    pub empty_detections: EmptyDetectionPolicy,
    /// Refuse to start with an empty gallery. Default `true`.
    pub require_gallery: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            cosine_threshold: 0.63,
            confidence_threshold: 0.95,
            min_face_size: 40.0,
            detect_interval: 5,
            max_missed_frames: 10,
            embedding_refresh_interval: 10,
            smoothing_window: 3,
            duplicate_iou_threshold: 0.3,
            remove_iou_threshold: 0.20,
            unknown_drop_frames: 3,
            cadence: RecognitionCadence::default(),
            empty_detections: EmptyDetectionPolicy::default(),
            require_gallery: true,
        }
    }
}

impl TrackerConfig {
    /// Set cosine_threshold
    pub fn with_cosine_threshold(&mut self, cosine_threshold: f32) -> &mut Self {
        self.cosine_threshold = cosine_threshold;
        self
    }

    /// Set confidence_threshold
    pub fn with_confidence_threshold(&mut self, confidence_threshold: f32) -> &mut Self {
        self.confidence_threshold = confidence_threshold;
        self
    }

    /// Set min_face_size
    pub fn with_min_face_size(&mut self, min_face_size: f32) -> &mut Self {
        self.min_face_size = min_face_size;
        self
    }

    /// Set detect_interval
    pub fn with_detect_interval(&mut self, detect_interval: usize) -> &mut Self {
        self.detect_interval = detect_interval;
        self
    }

    /// Set max_missed_frames
    pub fn with_max_missed_frames(&mut self, max_missed_frames: usize) -> &mut Self {
        self.max_missed_frames = max_missed_frames;
        self
    }

    /// Set embedding_refresh_interval
    pub fn with_embedding_refresh_interval(&mut self, embedding_refresh_interval: usize) -> &mut Self {
        self.embedding_refresh_interval = embedding_refresh_interval;
        self
    }

    /// Set smoothing_window
    pub fn with_smoothing_window(&mut self, smoothing_window: usize) -> &mut Self {
        self.smoothing_window = smoothing_window;
        self
    }

    /// Set duplicate_iou_threshold
    pub fn with_duplicate_iou_threshold(&mut self, duplicate_iou_threshold: f32) -> &mut Self {
        self.duplicate_iou_threshold = duplicate_iou_threshold;
        self
    }

    /// Set remove_iou_threshold
    pub fn with_remove_iou_threshold(&mut self, remove_iou_threshold: f32) -> &mut Self {
        self.remove_iou_threshold = remove_iou_threshold;
        self
    }

    /// Set unknown_drop_frames
    pub fn with_unknown_drop_frames(&mut self, unknown_drop_frames: usize) -> &mut Self {
        self.unknown_drop_frames = unknown_drop_frames;
        self
    }

    /// Set cadence
    pub fn with_cadence(&mut self, cadence: RecognitionCadence) -> &mut Self {
        self.cadence = cadence;
        self
    }

    /// Set empty_detections
    pub fn with_empty_detections(&mut self, empty_detections: EmptyDetectionPolicy) -> &mut Self {
        self.empty_detections = empty_detections;
        self
    }

    /// Set require_gallery
    pub fn with_require_gallery(&mut self, require_gallery: bool) -> &mut Self {
        self.require_gallery = require_gallery;
        self
    }

    /// Check every threshold once, before the first frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        [
            ("detect_interval", self.detect_interval),
            ("max_missed_frames", self.max_missed_frames),
            ("embedding_refresh_interval", self.embedding_refresh_interval),
            ("smoothing_window", self.smoothing_window),
            ("unknown_drop_frames", self.unknown_drop_frames),
        ]
        .into_iter()
        .try_for_each(|(name, value)| {
            if value == 0 {
                Err(ConfigError::ZeroCount { name, value })
            } else {
                Ok(())
            }
        })?;

        [
            ("cosine_threshold", self.cosine_threshold, f32::EPSILON, 2.0),
            ("confidence_threshold", self.confidence_threshold, 0.0, 1.0),
            ("duplicate_iou_threshold", self.duplicate_iou_threshold, 0.0, 1.0),
            ("remove_iou_threshold", self.remove_iou_threshold, 0.0, 1.0),
            ("min_face_size", self.min_face_size, 0.0, f32::MAX),
        ]
        .into_iter()
        .try_for_each(|(name, value, min, max)| {
            // NaN fails both comparisons
            if value >= min && value <= max {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    name,
                    value,
                    min,
                    max,
                })
            }
        })
    }
}
