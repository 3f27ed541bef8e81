mod attendance;
mod bounding_box;
mod config;
mod detection;
mod driver;
mod embedding;
mod error;
mod gallery;
mod identity;
pub mod iou_matching;
mod kalman_filter;
mod motion;
mod nn_matching;
mod smoothing;
mod track;
mod tracker;

pub use attendance::{AttendanceRecord, AttendanceRegistry};
pub use bounding_box::BoundingBox;
pub use config::{EmptyDetectionPolicy, RecognitionCadence, TrackerConfig};
pub use detection::{Detection, Detector};
pub use driver::{Frame, FrameDriver, FrameReport, FrameSource, StopHandle};
pub use embedding::{normalize, EmbeddingExtractor};
pub use error::{ConfigError, EngineError};
pub use gallery::Gallery;
pub use identity::Identity;
pub use kalman_filter::KalmanFilter;
pub use motion::{KalmanPredictor, MotionPredictor, PredictorFactory};
pub use nn_matching::{cosine_distance, IdentityResolver, Resolution};
pub use smoothing::RecognitionSmoother;
pub use track::{Track, TrackSnapshot};
pub use tracker::{Eviction, FrameUpdate, Tracker};
