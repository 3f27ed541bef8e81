use crate::*;
use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::*;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Why a track left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// The motion predictor failed `max_missed_frames` times in a row.
    MissedFrames,
    /// A detection cycle found no detection overlapping the track by at least `remove_iou_threshold`.
    NoMatchingDetection,
    /// The track was displayed as unknown for `unknown_drop_frames` consecutive detection cycles.
    UnknownStreak,
}

/// What changed while processing one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameUpdate {
    /// The 1-based number of frames processed so far, including this one.
    pub frame_count: usize,
    /// Whether the detector ran on this frame.
    pub detection_cycle: bool,
    /// Identifiers of tracks created on this frame.
    pub spawned: Vec<usize>,
    /// Identifiers of tracks removed on this frame.
    pub evicted: Vec<(usize, Eviction)>,
    /// Identities recorded in the attendance registry for the first time on this frame.
    pub attendance: Vec<AttendanceRecord>,
}

/// The track store and per-frame update loop.
///
/// Each call to `update` is one complete pass over the store:
///
/// 1. every track's motion predictor is advanced and tracks that missed too many frames are evicted,
/// 2. on detection cycles the detector runs, tracks that no longer match a detection (or stay unknown) are pruned and
///    unclaimed detections spawn new tracks,
/// 3. embeddings are periodically refreshed and identities are resolved and smoothed, recording attendance on promotion.
///
/// # Examples
///
/// ```no_run
/// use anyhow::Result;
/// use facetrack_rs::*;
/// use image::RgbImage;
/// use ndarray::Array1;
///
/// struct Faces;
///
/// impl Detector for Faces {
///     fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
///         Ok(vec![Detection::new(BoundingBox::new(100.0, 80.0, 120.0, 140.0), 0.99)])
///     }
/// }
///
/// struct Embedder;
///
/// impl EmbeddingExtractor for Embedder {
///     fn extract(&self, _crop: &RgbImage) -> Result<Array1<f32>> {
///         Ok(Array1::from_elem(128, 1.0))
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let gallery = Gallery::new(vec![("Alice".to_string(), vec![1.0; 128])])?;
/// let mut tracker = Tracker::new(
///     TrackerConfig::default(),
///     gallery,
///     Box::new(Embedder),
///     KalmanPredictor::factory(None),
/// )?;
///
/// let frame = Frame::new(1, chrono::Utc::now(), RgbImage::new(640, 480));
/// tracker.update(&frame, &mut Faces)?;
///
/// for track in tracker.snapshots() {
///     println!("{} {:?} {}", track.track_id, track.bbox, track.name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Tracker {
    config: TrackerConfig,
    /// The known identities.
    gallery: Gallery,
    resolver: IdentityResolver,
    smoother: RecognitionSmoother,
    extractor: Box<dyn EmbeddingExtractor>,
    predictor_factory: PredictorFactory,
    /// The active tracks, in creation order.
    tracks: Vec<Track>,
    attendance: AttendanceRegistry,
    /// Used to allocate identifiers to new tracks.
    next_id: usize,
    /// Number of frames processed.
    frame_count: usize,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("gallery", &self.gallery)
            .field("tracks", &self.tracks)
            .field("attendance", &self.attendance)
            .field("next_id", &self.next_id)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl Tracker {
    /// Returns a new Tracker
    ///
    /// # Parameters
    ///
    /// * `config`: Thresholds and intervals, validated here.
    /// * `gallery`: The known identities. Must be non-empty unless `config.require_gallery` is `false`.
    /// * `extractor`: Computes embeddings for face crops.
    /// * `predictor_factory`: Creates the motion predictor of each new track.
    pub fn new(
        config: TrackerConfig,
        gallery: Gallery,
        extractor: Box<dyn EmbeddingExtractor>,
        predictor_factory: PredictorFactory,
    ) -> Result<Tracker, ConfigError> {
        config.validate()?;
        if config.require_gallery && gallery.is_empty() {
            return Err(ConfigError::EmptyGallery);
        }

        Ok(Tracker {
            resolver: IdentityResolver::new(Some(config.cosine_threshold)),
            smoother: RecognitionSmoother::new(Some(config.smoothing_window)),
            config,
            gallery,
            extractor,
            predictor_factory,
            tracks: Vec::new(),
            attendance: AttendanceRegistry::new(),
            next_id: 1,
            frame_count: 0,
        })
    }

    /// Return the configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Return the gallery
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Return the active tracks
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Return a track by identifier
    pub fn track(&self, track_id: usize) -> Option<&Track> {
        self.tracks.iter().find(|track| track.track_id() == track_id)
    }

    /// Returns a copy of every active track
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.tracks.iter().map(Track::snapshot).collect()
    }

    /// Return the attendance registry
    pub fn attendance(&self) -> &AttendanceRegistry {
        &self.attendance
    }

    /// Return the number of frames processed
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Process one frame.
    ///
    /// Collaborator failures (a lost target, a failed detection or embedding) are logged and absorbed. The only error
    /// is a frame without pixels.
    ///
    /// # Parameters
    ///
    /// * `frame`: The current frame.
    /// * `detector`: Invoked if this frame is a detection cycle.
    pub fn update<D: Detector + ?Sized>(
        &mut self,
        frame: &Frame,
        detector: &mut D,
    ) -> Result<FrameUpdate, EngineError> {
        if frame.image.width() == 0 || frame.image.height() == 0 {
            return Err(EngineError::EmptyFrame { index: frame.index });
        }

        self.frame_count += 1;
        let detection_cycle = self.frame_count % self.config.detect_interval == 0;
        let mut update = FrameUpdate {
            frame_count: self.frame_count,
            detection_cycle,
            ..Default::default()
        };

        // Step 1
        // Advance every motion predictor and drop tracks that have been lost for too long.
        let mut updated = HashSet::new();
        for track in self.tracks.iter_mut() {
            if track.predict(&frame.image) {
                updated.insert(track.track_id());
            } else {
                debug!(
                    track_id = track.track_id(),
                    missed_frames = track.missed_frames(),
                    "motion update failed"
                );
            }
        }

        let max_missed_frames = self.config.max_missed_frames;
        self.evict(&mut update, Eviction::MissedFrames, |track| {
            track.missed_frames() >= max_missed_frames
        });

        // Step 2
        // Reconcile with fresh detections: prune strictly before spawning.
        if detection_cycle {
            match detector.detect(&frame.image) {
                Ok(detections) => {
                    let boxes = Detection::filter(
                        detections,
                        frame.image.width(),
                        frame.image.height(),
                        &self.config,
                    );
                    self.prune(&boxes, &mut update);
                    self.spawn(frame, boxes, &mut update);
                }
                Err(err) => {
                    warn!(frame = frame.index, error = %err, "detector failed, skipping detection cycle");
                }
            }
        }

        // Step 3
        // Refresh embeddings and feed resolved identities through the smoother.
        if self.frame_count % self.config.embedding_refresh_interval == 0 {
            self.refresh_embeddings(&frame.image, &updated);
        }

        let observe = match self.config.cadence {
            RecognitionCadence::DetectionCycle => detection_cycle,
            RecognitionCadence::EveryFrame => true,
        };
        if observe {
            self.recognize(frame, &updated, &mut update);
        }

        Ok(update)
    }

    /// Remove every track matching `predicate`, recording `reason`.
    fn evict<F>(&mut self, update: &mut FrameUpdate, reason: Eviction, predicate: F)
    where
        F: Fn(&Track) -> bool,
    {
        self.tracks.retain(|track| {
            if predicate(track) {
                debug!(track_id = track.track_id(), ?reason, "track evicted");
                update.evicted.push((track.track_id(), reason));
                false
            } else {
                true
            }
        });
    }

    /// Evict tracks that no longer correspond to a detection, and tracks that keep displaying as unknown.
    fn prune(&mut self, boxes: &[BoundingBox], update: &mut FrameUpdate) {
        if boxes.is_empty() && self.config.empty_detections == EmptyDetectionPolicy::RetainTracks {
            debug!(tracks = self.tracks.len(), "no detections, retaining tracks");
            return;
        }

        let remove_iou_threshold = self.config.remove_iou_threshold;
        let unknown_drop_frames = self.config.unknown_drop_frames;

        self.tracks.retain_mut(|track| {
            let reason = if iou_matching::max_iou(track.bbox(), boxes) < remove_iou_threshold {
                Some(Eviction::NoMatchingDetection)
            } else if track.mark_matched() >= unknown_drop_frames {
                Some(Eviction::UnknownStreak)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    debug!(track_id = track.track_id(), ?reason, "track evicted");
                    update.evicted.push((track.track_id(), reason));
                    false
                }
                None => true,
            }
        });
    }

    /// Create a track for every detection not already claimed by a track.
    fn spawn(&mut self, frame: &Frame, boxes: Vec<BoundingBox>, update: &mut FrameUpdate) {
        let duplicate_iou_threshold = self.config.duplicate_iou_threshold;

        // a detection is claimed by surviving tracks and by detections accepted earlier in this cycle
        let mut accepted: Vec<(BoundingBox, RgbImage)> = Vec::new();
        for bbox in boxes {
            let claimed = self
                .tracks
                .iter()
                .map(Track::bbox)
                .chain(accepted.iter().map(|(accepted, _)| accepted))
                .any(|other| iou_matching::iou(other, &bbox) > duplicate_iou_threshold);
            if claimed {
                continue;
            }

            match crop(&frame.image, &bbox) {
                Some(face) => accepted.push((bbox, face)),
                None => debug!(?bbox, "empty crop, not spawning"),
            }
        }

        let extractor = &self.extractor;
        let embeddings = accepted
            .par_iter()
            .map(|(_, face)| extractor.extract(face))
            .collect::<Vec<_>>();

        for ((bbox, _), embedding) in accepted.into_iter().zip(embeddings) {
            let embedding = match embedding {
                Ok(embedding) => normalize(embedding.view()),
                Err(err) => {
                    warn!(?bbox, error = %err, "embedding extraction failed for new track");
                    None
                }
            };

            let candidate = match &embedding {
                Some(embedding) => match self.resolver.resolve(&self.gallery, embedding.view()) {
                    Ok(resolution) => resolution.identity,
                    Err(err) => {
                        warn!(?bbox, error = %err, "identity resolution failed for new track");
                        Identity::Unknown
                    }
                },
                None => Identity::Unknown,
            };

            let mut predictor = (self.predictor_factory)();
            if let Err(err) = predictor.init(&frame.image, &bbox) {
                warn!(?bbox, error = %err, "motion predictor failed to initialize");
                continue;
            }

            let track = Track::new(self.next_id, bbox, predictor, embedding, candidate);
            self.next_id += 1;

            debug!(
                track_id = track.track_id(),
                bbox = ?track.bbox(),
                candidate = %track.candidate_name(),
                "track spawned"
            );
            update.spawned.push(track.track_id());
            self.tracks.push(track);
        }
    }

    /// Recompute the embedding of every track updated on this frame. Failures keep the previous embedding.
    fn refresh_embeddings(&mut self, image: &RgbImage, updated: &HashSet<usize>) {
        let faces = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| updated.contains(&track.track_id()))
            .filter_map(|(index, track)| crop(image, track.bbox()).map(|face| (index, face)))
            .collect::<Vec<_>>();

        let extractor = &self.extractor;
        let embeddings: Vec<(usize, Result<Array1<f32>>)> = faces
            .into_par_iter()
            .map(|(index, face)| (index, extractor.extract(&face)))
            .collect();

        for (index, embedding) in embeddings {
            let track = &mut self.tracks[index];
            match embedding {
                Ok(embedding) => {
                    if !track.set_embedding(embedding.view()) {
                        warn!(track_id = track.track_id(), "extractor returned a zero-length embedding");
                    }
                }
                Err(err) => {
                    warn!(track_id = track.track_id(), error = %err, "embedding refresh failed");
                }
            }
        }
    }

    /// Resolve and smooth the identity of every track updated on this frame.
    fn recognize(&mut self, frame: &Frame, updated: &HashSet<usize>, update: &mut FrameUpdate) {
        for track in self.tracks.iter_mut() {
            if !updated.contains(&track.track_id()) {
                continue;
            }

            let resolution = match track.embedding() {
                Some(embedding) => self.resolver.resolve(&self.gallery, embedding.view()),
                None => continue,
            };

            let resolution = match resolution {
                Ok(resolution) => resolution,
                Err(err) => {
                    warn!(track_id = track.track_id(), error = %err, "identity resolution failed");
                    continue;
                }
            };

            let Some(name) = self.smoother.observe(track, resolution.identity) else {
                continue;
            };

            debug!(track_id = track.track_id(), name = %name, distance = resolution.distance, "identity confirmed");
            if self.attendance.record(&name, frame.timestamp) {
                update.attendance.push(AttendanceRecord {
                    name,
                    first_seen: frame.timestamp,
                });
            }
        }
    }
}

/// Crop `bbox` out of `image` on whole pixels. Returns `None` if nothing remains.
fn crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let x1 = bbox.x().round().clamp(0.0, image.width() as f32) as u32;
    let y1 = bbox.y().round().clamp(0.0, image.height() as f32) as u32;
    let x2 = (bbox.x() + bbox.width()).round().clamp(0.0, image.width() as f32) as u32;
    let y2 = (bbox.y() + bbox.height()).round().clamp(0.0, image.height() as f32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

#[cfg(test)]
mod tests {
    use crate::*;
    use anyhow::{anyhow, bail, Result};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use image::{Rgb, RgbImage};
    use ndarray::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    const ALICE: Rgb<u8> = Rgb([255, 124, 0]);
    const BOB: Rgb<u8> = Rgb([0, 255, 0]);
    const STRANGER: Rgb<u8> = Rgb([0, 0, 255]);

    /// Embeds a crop as the colour of its centre pixel.
    struct ColourExtractor;

    impl EmbeddingExtractor for ColourExtractor {
        fn extract(&self, crop: &RgbImage) -> Result<Array1<f32>> {
            if crop.width() == 0 || crop.height() == 0 {
                bail!("empty crop");
            }
            let pixel = crop.get_pixel(crop.width() / 2, crop.height() / 2);
            Ok(Array1::from_iter(pixel.0.iter().map(|&v| v as f32 / 255.0)))
        }
    }

    struct FailingExtractor;

    impl EmbeddingExtractor for FailingExtractor {
        fn extract(&self, _crop: &RgbImage) -> Result<Array1<f32>> {
            Err(anyhow!("model unavailable"))
        }
    }

    /// Holds the initial box until the shared `lost` flag is raised.
    struct Still {
        bbox: Option<BoundingBox>,
        lost: Arc<AtomicBool>,
    }

    impl MotionPredictor for Still {
        fn init(&mut self, _image: &RgbImage, bbox: &BoundingBox) -> Result<()> {
            self.bbox = Some(*bbox);
            Ok(())
        }

        fn update(&mut self, _image: &RgbImage) -> Result<BoundingBox> {
            if self.lost.load(Ordering::SeqCst) {
                bail!("lost");
            }
            self.bbox.ok_or_else(|| anyhow!("not initialized"))
        }
    }

    #[derive(Default)]
    struct Scene {
        detections: Vec<Detection>,
        fail: bool,
    }

    impl Detector for Scene {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            if self.fail {
                bail!("detector crashed");
            }
            Ok(self.detections.clone())
        }
    }

    fn gallery() -> Gallery {
        Gallery::new(vec![
            ("Alice".to_string(), vec![1.0, 0.0, 0.0]),
            ("Bob".to_string(), vec![0.0, 1.0, 0.0]),
        ])
        .unwrap()
    }

    fn tracker(config: TrackerConfig, lost: Arc<AtomicBool>) -> Tracker {
        Tracker::new(
            config,
            gallery(),
            Box::new(ColourExtractor),
            Box::new(move || {
                Box::new(Still {
                    bbox: None,
                    lost: lost.clone(),
                })
            }),
        )
        .unwrap()
    }

    fn timestamp(index: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::milliseconds(index as i64 * 40)
    }

    /// A frame with each box filled with its colour.
    fn frame(index: u64, faces: &[(BoundingBox, Rgb<u8>)]) -> Frame {
        let mut image = RgbImage::new(640, 480);
        for (bbox, colour) in faces {
            for y in bbox.y() as u32..(bbox.y() + bbox.height()) as u32 {
                for x in bbox.x() as u32..(bbox.x() + bbox.width()) as u32 {
                    image.put_pixel(x, y, *colour);
                }
            }
        }
        Frame::new(index, timestamp(index), image)
    }

    fn face() -> BoundingBox {
        BoundingBox::new(100.0, 100.0, 80.0, 80.0)
    }

    /// Run frames `from..=to` over a static scene, returning the update of the last frame.
    fn run(
        tracker: &mut Tracker,
        scene: &mut Scene,
        faces: &[(BoundingBox, Rgb<u8>)],
        from: u64,
        to: u64,
    ) -> Result<FrameUpdate> {
        let mut last = FrameUpdate::default();
        for index in from..=to {
            last = tracker.update(&frame(index, faces), scene)?;
        }
        Ok(last)
    }

    #[test]
    fn confirms_on_third_detection_cycle() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        let update = run(&mut tracker, &mut scene, &faces, 1, 5)?;
        assert_eq!(update.spawned, vec![1]);
        assert_eq!(tracker.tracks()[0].candidate_name(), &Identity::Known("Alice".to_string()));
        assert_eq!(tracker.tracks()[0].confirmed_name(), None);

        run(&mut tracker, &mut scene, &faces, 6, 14)?;
        assert_eq!(tracker.tracks()[0].confirmed_name(), None);
        assert!(tracker.attendance().is_empty());

        let update = run(&mut tracker, &mut scene, &faces, 15, 15)?;
        assert_eq!(
            tracker.tracks()[0].confirmed_name(),
            Some(&Identity::Known("Alice".to_string()))
        );
        assert_eq!(
            update.attendance,
            vec![AttendanceRecord {
                name: "Alice".to_string(),
                first_seen: timestamp(15)
            }]
        );

        run(&mut tracker, &mut scene, &faces, 16, 40)?;
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.attendance().len(), 1);
        assert_eq!(tracker.attendance().get("Alice"), Some(timestamp(15)));
        assert_eq!(tracker.tracks()[0].unknown_streak(), 0);
        Ok(())
    }

    #[test]
    fn every_frame_cadence() -> Result<()> {
        let config = TrackerConfig::default()
            .with_cadence(RecognitionCadence::EveryFrame)
            .to_owned();
        let mut tracker = tracker(config, Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 6)?;
        assert_eq!(tracker.tracks()[0].confirmed_name(), None);
        let update = run(&mut tracker, &mut scene, &faces, 7, 7)?;
        assert_eq!(update.attendance.len(), 1);
        assert_eq!(tracker.attendance().get("Alice"), Some(timestamp(7)));
        Ok(())
    }

    #[test]
    fn evicts_after_missed_frames() -> Result<()> {
        let lost = Arc::new(AtomicBool::new(false));
        let config = TrackerConfig::default()
            .with_empty_detections(EmptyDetectionPolicy::RetainTracks)
            .to_owned();
        let mut tracker = tracker(config, lost.clone());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        assert_eq!(tracker.len(), 1);

        lost.store(true, Ordering::SeqCst);
        scene.detections.clear();
        run(&mut tracker, &mut scene, &faces, 6, 14)?;
        assert_eq!(tracker.tracks()[0].missed_frames(), 9);
        // the box is kept while the target is lost
        assert_eq!(tracker.tracks()[0].bbox(), &face());

        let update = run(&mut tracker, &mut scene, &faces, 15, 15)?;
        assert_eq!(update.evicted, vec![(1, Eviction::MissedFrames)]);
        assert!(tracker.is_empty());
        Ok(())
    }

    #[test]
    fn successful_update_resets_missed_frames() -> Result<()> {
        let lost = Arc::new(AtomicBool::new(false));
        let config = TrackerConfig::default()
            .with_empty_detections(EmptyDetectionPolicy::RetainTracks)
            .to_owned();
        let mut tracker = tracker(config, lost.clone());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        scene.detections.clear();
        lost.store(true, Ordering::SeqCst);
        run(&mut tracker, &mut scene, &faces, 6, 12)?;
        assert_eq!(tracker.tracks()[0].missed_frames(), 7);

        lost.store(false, Ordering::SeqCst);
        run(&mut tracker, &mut scene, &faces, 13, 13)?;
        assert_eq!(tracker.tracks()[0].missed_frames(), 0);
        Ok(())
    }

    #[test]
    fn evicts_stale_unknown() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), STRANGER)];

        run(&mut tracker, &mut scene, &faces, 1, 15)?;
        assert_eq!(tracker.tracks()[0].unknown_streak(), 2);
        assert_eq!(tracker.tracks()[0].displayed_name(), &Identity::Unknown);

        // the box still matches, but the track has been unknown for three detection cycles
        let update = run(&mut tracker, &mut scene, &faces, 16, 20)?;
        assert_eq!(update.evicted, vec![(1, Eviction::UnknownStreak)]);
        // the unclaimed detection starts a fresh track, identifiers are never reused
        assert_eq!(update.spawned, vec![2]);
        assert!(tracker.attendance().is_empty());
        Ok(())
    }

    #[test]
    fn empty_detections_evict_all_by_default() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        scene.detections.clear();
        let update = run(&mut tracker, &mut scene, &faces, 6, 10)?;

        assert_eq!(update.evicted, vec![(1, Eviction::NoMatchingDetection)]);
        assert!(tracker.is_empty());
        Ok(())
    }

    #[test]
    fn empty_detections_retain_tracks() -> Result<()> {
        let config = TrackerConfig::default()
            .with_empty_detections(EmptyDetectionPolicy::RetainTracks)
            .to_owned();
        let mut tracker = tracker(config, Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        scene.detections.clear();
        let update = run(&mut tracker, &mut scene, &faces, 6, 10)?;

        assert!(update.evicted.is_empty());
        assert_eq!(tracker.len(), 1);
        // pruning was skipped, so the streak did not advance
        assert_eq!(tracker.tracks()[0].unknown_streak(), 0);
        Ok(())
    }

    #[test]
    fn filtered_detections_count_as_empty() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        scene.detections = vec![Detection::new(face(), 0.5)];
        run(&mut tracker, &mut scene, &faces, 6, 10)?;
        assert!(tracker.is_empty());
        Ok(())
    }

    #[test]
    fn detector_failure_skips_cycle() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        run(&mut tracker, &mut scene, &faces, 1, 5)?;
        scene.fail = true;
        let update = run(&mut tracker, &mut scene, &faces, 6, 10)?;

        assert!(update.detection_cycle);
        assert!(update.evicted.is_empty());
        assert_eq!(tracker.len(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_detections_do_not_spawn() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let shifted = BoundingBox::new(110.0, 105.0, 80.0, 80.0);
        let mut scene = Scene {
            detections: vec![
                Detection::new(face(), 0.99),
                Detection::new(shifted, 0.99),
            ],
            ..Default::default()
        };
        let faces = [(face(), ALICE)];

        let update = run(&mut tracker, &mut scene, &faces, 1, 5)?;
        assert_eq!(update.spawned, vec![1]);

        let update = run(&mut tracker, &mut scene, &faces, 6, 10)?;
        assert!(update.spawned.is_empty());
        assert_eq!(tracker.len(), 1);
        Ok(())
    }

    #[test]
    fn separate_faces_spawn_separate_tracks() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let other = BoundingBox::new(400.0, 100.0, 80.0, 80.0);
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99), Detection::new(other, 0.99)],
            ..Default::default()
        };
        let faces = [(face(), ALICE), (other, Rgb([0, 255, 0]))];

        run(&mut tracker, &mut scene, &faces, 1, 15)?;
        assert_eq!(tracker.len(), 2);

        let names = tracker
            .snapshots()
            .into_iter()
            .map(|snapshot| snapshot.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);

        let attendance = tracker
            .attendance()
            .records()
            .into_iter()
            .map(|record| record.name)
            .collect::<Vec<_>>();
        assert_eq!(attendance, vec!["Alice".to_string(), "Bob".to_string()]);
        Ok(())
    }

    #[test]
    fn moved_face_is_pruned_and_respawned() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };

        run(&mut tracker, &mut scene, &[(face(), ALICE)], 1, 5)?;

        let moved = BoundingBox::new(400.0, 300.0, 80.0, 80.0);
        scene.detections = vec![Detection::new(moved, 0.99)];
        let update = run(&mut tracker, &mut scene, &[(moved, ALICE)], 6, 10)?;

        assert_eq!(update.evicted, vec![(1, Eviction::NoMatchingDetection)]);
        assert_eq!(update.spawned, vec![2]);
        assert_eq!(tracker.tracks()[0].bbox(), &moved);
        Ok(())
    }

    #[test]
    fn extraction_failure_still_spawns() -> Result<()> {
        let mut tracker = Tracker::new(
            TrackerConfig::default(),
            gallery(),
            Box::new(FailingExtractor),
            Box::new(|| {
                Box::new(Still {
                    bbox: None,
                    lost: Arc::default(),
                })
            }),
        )?;
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };

        run(&mut tracker, &mut scene, &[(face(), ALICE)], 1, 5)?;
        assert_eq!(tracker.len(), 1);
        assert!(tracker.tracks()[0].embedding().is_none());
        assert_eq!(tracker.tracks()[0].candidate_name(), &Identity::Unknown);

        // refreshes keep failing, so the track is never resolved and is dropped as unknown
        let update = run(&mut tracker, &mut scene, &[(face(), ALICE)], 6, 20)?;
        assert_eq!(update.evicted, vec![(1, Eviction::UnknownStreak)]);
        Ok(())
    }

    #[test]
    fn refresh_replaces_embedding() -> Result<()> {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };

        run(&mut tracker, &mut scene, &[(face(), ALICE)], 1, 5)?;
        assert_eq!(tracker.tracks()[0].candidate_name(), &Identity::Known("Alice".to_string()));

        run(&mut tracker, &mut scene, &[(face(), BOB)], 6, 9)?;
        assert_ne!(tracker.tracks()[0].embedding(), Some(&arr1(&[0.0, 1.0, 0.0])));

        run(&mut tracker, &mut scene, &[(face(), BOB)], 10, 10)?;
        let track = &tracker.tracks()[0];
        assert_eq!(track.embedding(), Some(&arr1(&[0.0, 1.0, 0.0])));
        assert_eq!(track.candidate_name(), &Identity::Known("Bob".to_string()));
        assert_eq!(track.consecutive_frames(), 1);
        Ok(())
    }

    /// Delegates to `ColourExtractor` until `fail` is raised.
    struct Flaky {
        fail: Arc<AtomicBool>,
    }

    impl EmbeddingExtractor for Flaky {
        fn extract(&self, crop: &RgbImage) -> Result<Array1<f32>> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("model unavailable");
            }
            ColourExtractor.extract(crop)
        }
    }

    #[test]
    fn failed_refresh_keeps_embedding() -> Result<()> {
        let fail = Arc::new(AtomicBool::new(false));
        let mut tracker = Tracker::new(
            TrackerConfig::default(),
            gallery(),
            Box::new(Flaky { fail: fail.clone() }),
            Box::new(|| {
                Box::new(Still {
                    bbox: None,
                    lost: Arc::default(),
                })
            }),
        )?;
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };

        run(&mut tracker, &mut scene, &[(face(), ALICE)], 1, 5)?;
        let before = tracker.tracks()[0].embedding().cloned();
        assert!(before.is_some());

        fail.store(true, Ordering::SeqCst);
        run(&mut tracker, &mut scene, &[(face(), BOB)], 6, 10)?;
        let track = &tracker.tracks()[0];
        assert_eq!(track.embedding(), before.as_ref());
        assert_eq!(track.candidate_name(), &Identity::Known("Alice".to_string()));
        assert_eq!(track.consecutive_frames(), 2);
        Ok(())
    }

    /// Holds the initial box until `moved` is raised, then reports a box that clamps to a sliver under one pixel wide
    /// at the right edge of the frame.
    struct Drifting {
        bbox: Option<BoundingBox>,
        moved: Arc<AtomicBool>,
    }

    impl MotionPredictor for Drifting {
        fn init(&mut self, _image: &RgbImage, bbox: &BoundingBox) -> Result<()> {
            self.bbox = Some(*bbox);
            Ok(())
        }

        fn update(&mut self, _image: &RgbImage) -> Result<BoundingBox> {
            let bbox = self.bbox.ok_or_else(|| anyhow!("not initialized"))?;
            if self.moved.load(Ordering::SeqCst) {
                return Ok(BoundingBox::new(639.6, bbox.y(), bbox.width(), bbox.height()));
            }
            Ok(bbox)
        }
    }

    #[test]
    fn empty_crop_keeps_embedding() -> Result<()> {
        let moved = Arc::new(AtomicBool::new(false));
        let factory_moved = moved.clone();
        // detection cycles on 7 and 14, refresh on 10
        let config = TrackerConfig::default().with_detect_interval(7).to_owned();
        let mut tracker = Tracker::new(
            config,
            gallery(),
            Box::new(ColourExtractor),
            Box::new(move || {
                Box::new(Drifting {
                    bbox: None,
                    moved: factory_moved.clone(),
                })
            }),
        )?;
        let mut scene = Scene {
            detections: vec![Detection::new(face(), 0.99)],
            ..Default::default()
        };

        run(&mut tracker, &mut scene, &[(face(), ALICE)], 1, 7)?;
        let before = tracker.tracks()[0].embedding().cloned();
        assert!(before.is_some());

        moved.store(true, Ordering::SeqCst);
        run(&mut tracker, &mut scene, &[(face(), BOB)], 8, 10)?;
        let track = &tracker.tracks()[0];
        assert_eq!(track.missed_frames(), 0);
        assert!(track.bbox().x() > 639.0 && track.bbox().width() < 1.0);
        assert_eq!(track.embedding(), before.as_ref());
        Ok(())
    }

    #[test]
    fn empty_gallery_is_rejected() {
        let result = Tracker::new(
            TrackerConfig::default(),
            Gallery::default(),
            Box::new(ColourExtractor),
            KalmanPredictor::factory(None),
        );
        assert_eq!(result.unwrap_err(), ConfigError::EmptyGallery);

        let config = TrackerConfig::default().with_require_gallery(false).to_owned();
        assert!(Tracker::new(
            config,
            Gallery::default(),
            Box::new(ColourExtractor),
            KalmanPredictor::factory(None),
        )
        .is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrackerConfig::default().with_smoothing_window(0).to_owned();
        let result = Tracker::new(
            config,
            gallery(),
            Box::new(ColourExtractor),
            KalmanPredictor::factory(None),
        );
        assert!(matches!(result, Err(ConfigError::ZeroCount { .. })));
    }

    #[test]
    fn empty_frame_is_fatal() {
        let mut tracker = tracker(TrackerConfig::default(), Arc::default());
        let frame = Frame::new(1, timestamp(1), RgbImage::new(0, 0));
        assert_eq!(
            tracker.update(&frame, &mut Scene::default()),
            Err(EngineError::EmptyFrame { index: 1 })
        );
        assert_eq!(tracker.frame_count(), 0);
    }
}
