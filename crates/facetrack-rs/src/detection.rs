use crate::{BoundingBox, TrackerConfig};
use anyhow::Result;
use image::RgbImage;

/// Detection represents a face bounding box detection in a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in top, left, width, height format.
    bbox: BoundingBox,
    /// Detection confidence score.
    confidence: f32,
}

impl Detection {
    /// Returns a new Detection
    ///
    /// # Parameters
    ///
    /// * `bbox`: A bounding box object.
    /// * `confidence`: Detection confidence score.
    pub fn new(bbox: BoundingBox, confidence: f32) -> Detection {
        Detection { bbox, confidence }
    }

    /// Returns a BoundingBox of the detection co-ordinates
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Returns the confidence of the detection
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Keep the detections that are usable for tracking.
    ///
    /// Detections below `confidence_threshold` are discarded, the remainder are clamped to the frame and discarded if
    /// the clamped box is empty or smaller than `min_face_size` on either side.
    ///
    /// # Parameters
    ///
    /// * `detections`: Raw detector output.
    /// * `frame_width`: Width of the frame the detections belong to.
    /// * `frame_height`: Height of the frame the detections belong to.
    /// * `config`: Thresholds to apply.
    pub fn filter(
        detections: Vec<Detection>,
        frame_width: u32,
        frame_height: u32,
        config: &TrackerConfig,
    ) -> Vec<BoundingBox> {
        detections
            .into_iter()
            .filter(|detection| detection.confidence() >= config.confidence_threshold)
            .filter_map(|detection| detection.bbox().clamp(frame_width, frame_height))
            .filter(|bbox| {
                bbox.width() >= config.min_face_size && bbox.height() >= config.min_face_size
            })
            .collect()
    }
}

/// The (expensive) face detector invoked on detection cycles.
pub trait Detector {
    /// Detect faces in `image`. An empty list means nothing is visible.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}
