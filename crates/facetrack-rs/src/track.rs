use crate::*;
use image::RgbImage;
use ndarray::*;
use std::hash::{Hash, Hasher};

static UNKNOWN: Identity = Identity::Unknown;

/// A single tracked face: its latest box, its identity evidence and the motion predictor that follows it between
/// detection cycles.
pub struct Track {
    /// A unique track identifier.
    track_id: usize,
    /// The latest box, clamped to the frame.
    bbox: BoundingBox,
    /// The per-track motion predictor.
    predictor: Box<dyn MotionPredictor>,
    /// Latest unit-norm feature vector.
    embedding: Option<Array1<f32>>,
    /// The promoted identity, `None` until the first promotion.
    confirmed_name: Option<Identity>,
    /// The most recent resolver output.
    candidate_name: Identity,
    /// Consecutive observations of `candidate_name`.
    consecutive_frames: usize,
    /// Consecutive motion predictor failures.
    missed_frames: usize,
    /// Consecutive detection cycles displayed as unknown.
    unknown_streak: usize,
    /// Total number of successful motion updates.
    hits: usize,
    /// Total number of frames since creation.
    age: usize,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("track_id", &self.track_id)
            .field("bbox", &self.bbox)
            .field("has_embedding", &self.embedding.is_some())
            .field("confirmed_name", &self.confirmed_name)
            .field("candidate_name", &self.candidate_name)
            .field("consecutive_frames", &self.consecutive_frames)
            .field("missed_frames", &self.missed_frames)
            .field("unknown_streak", &self.unknown_streak)
            .field("hits", &self.hits)
            .field("age", &self.age)
            .finish()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.track_id.hash(state);
    }
}

/// A copy of the externally visible state of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub track_id: usize,
    pub bbox: BoundingBox,
    /// The displayed name: the confirmed identity, or `Unknown` before the first promotion.
    pub name: Identity,
    /// Whether `name` has passed the smoothing window.
    pub confirmed: bool,
}

impl Track {
    /// Returns a new Track
    ///
    /// The track starts unconfirmed regardless of how confident the first observation is.
    ///
    /// # Parameters
    ///
    /// * `track_id`: A unique track identifier.
    /// * `bbox`: The detection box the track originates from.
    /// * `predictor`: An initialized motion predictor following `bbox`.
    /// * `embedding`: The feature vector of the detection crop, if extraction succeeded.
    /// * `candidate_name`: The resolved identity of `embedding`.
    pub fn new(
        track_id: usize,
        bbox: BoundingBox,
        predictor: Box<dyn MotionPredictor>,
        embedding: Option<Array1<f32>>,
        candidate_name: Identity,
    ) -> Track {
        Track {
            track_id,
            bbox,
            predictor,
            embedding: embedding.and_then(|embedding| normalize(embedding.view())),
            confirmed_name: None,
            candidate_name,
            consecutive_frames: 1,
            missed_frames: 0,
            unknown_streak: 0,
            hits: 1,
            age: 1,
        }
    }

    /// Return the identifier of the track
    pub fn track_id(&self) -> usize {
        self.track_id
    }

    /// Returns the track position bounding box
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Return the latest embedding of the track
    pub fn embedding(&self) -> Option<&Array1<f32>> {
        self.embedding.as_ref()
    }

    /// Return the confirmed identity of the track
    pub fn confirmed_name(&self) -> Option<&Identity> {
        self.confirmed_name.as_ref()
    }

    /// Return the identity shown for the track
    pub fn displayed_name(&self) -> &Identity {
        self.confirmed_name.as_ref().unwrap_or(&UNKNOWN)
    }

    /// Return the latest candidate identity of the track
    pub fn candidate_name(&self) -> &Identity {
        &self.candidate_name
    }

    /// Return the number of consecutive observations of the candidate
    pub fn consecutive_frames(&self) -> usize {
        self.consecutive_frames
    }

    /// Return the number of consecutive missed motion updates
    pub fn missed_frames(&self) -> usize {
        self.missed_frames
    }

    /// Return the number of consecutive unknown detection cycles
    pub fn unknown_streak(&self) -> usize {
        self.unknown_streak
    }

    /// Return the number of successful motion updates
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Return the number of frames since the track was created
    pub fn age(&self) -> usize {
        self.age
    }

    /// Returns a copy of the externally visible state
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.track_id,
            bbox: self.bbox,
            name: self.displayed_name().clone(),
            confirmed: self.confirmed_name.is_some(),
        }
    }

    /// Advance the motion predictor to `image`.
    ///
    /// On success the box is replaced by the clamped prediction and `missed_frames` resets. A lost target, or a
    /// prediction that clamps to an empty box, counts as a miss and leaves the box unchanged.
    ///
    /// # Returns
    ///
    /// `true` if the update succeeded.
    pub fn predict(&mut self, image: &RgbImage) -> bool {
        self.age += 1;

        let predicted = self
            .predictor
            .update(image)
            .ok()
            .and_then(|bbox| bbox.clamp(image.width(), image.height()));

        match predicted {
            Some(bbox) => {
                self.bbox = bbox;
                self.missed_frames = 0;
                self.hits += 1;
                true
            }
            None => {
                self.missed_frames += 1;
                false
            }
        }
    }

    /// Replace the embedding. Zero-length vectors are ignored.
    pub fn set_embedding(&mut self, embedding: ArrayView1<f32>) -> bool {
        match normalize(embedding) {
            Some(embedding) => {
                self.embedding = Some(embedding);
                true
            }
            None => false,
        }
    }

    /// Record a new candidate identity.
    ///
    /// # Returns
    ///
    /// The updated count of consecutive observations.
    pub(crate) fn observe_candidate(&mut self, candidate: Identity) -> usize {
        if candidate == self.candidate_name {
            self.consecutive_frames += 1;
        } else {
            self.candidate_name = candidate;
            self.consecutive_frames = 1;
        }
        self.consecutive_frames
    }

    /// Promote the current candidate to the confirmed identity.
    pub(crate) fn confirm_candidate(&mut self) {
        self.confirmed_name = Some(self.candidate_name.clone());
    }

    /// Update the unknown streak after a detection cycle matched this track.
    ///
    /// # Returns
    ///
    /// The updated streak.
    pub(crate) fn mark_matched(&mut self) -> usize {
        if self.displayed_name().is_known() {
            self.unknown_streak = 0;
        } else {
            self.unknown_streak += 1;
        }
        self.unknown_streak
    }
}
